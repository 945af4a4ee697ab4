//! Transport seams for REST and the push channel.
//!
//! The executors and the stream manager only ever see these traits, so
//! every behavior above this layer is testable without a network.

use crate::config::SyncConfig;
use crate::error::SyncError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::Message;
use tradepulse_core::StreamEnvelope;

/// JSON-over-HTTP boundary. `query` is appended to the URL; `body` is
/// sent as a JSON document when present.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get_json(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<serde_json::Value, SyncError>;

    async fn post_json(
        &self,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, SyncError>;
}

/// One established push-channel connection: a stream of envelopes.
///
/// `Err(SyncError::Stream(..))` items mean the connection itself broke;
/// any other error item is a malformed frame the consumer may discard
/// while keeping the connection.
pub type EventStream = BoxStream<'static, Result<StreamEnvelope, SyncError>>;

/// Push-channel boundary. Each call establishes a fresh connection; the
/// reconnect policy lives in the stream manager, not here.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn connect(&self) -> Result<EventStream, SyncError>;
}

// ============================================================================
// REST TRANSPORT (reqwest)
// ============================================================================

pub struct RestTransport {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
}

impl RestTransport {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|err| SyncError::Config(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_header: build_auth_headers(config)?,
        })
    }

    async fn parse_response(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, SyncError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<serde_json::Value>()
                .await
                .map_err(|err| from_reqwest(path, err));
        }

        let message = match response.text().await {
            Ok(text) => server_message(&text),
            Err(_) => status.to_string(),
        };
        Err(SyncError::Http {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl HttpTransport for RestTransport {
    async fn get_json(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<serde_json::Value, SyncError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(url).headers(self.auth_header.clone());
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request.send().await.map_err(|err| from_reqwest(path, err))?;
        self.parse_response(path, response).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, SyncError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(url).headers(self.auth_header.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|err| from_reqwest(path, err))?;
        self.parse_response(path, response).await
    }
}

/// Pull a usable message out of an error body: the platform wraps
/// messages as `{"detail": ...}`, other servers send plain text.
fn server_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(detail) = value.get("detail").and_then(|d| d.as_str()) {
            return detail.to_string();
        }
    }
    body.to_string()
}

fn from_reqwest(path: &str, err: reqwest::Error) -> SyncError {
    if err.is_decode() {
        SyncError::decode(path, err)
    } else {
        SyncError::transport(err)
    }
}

fn build_auth_headers(config: &SyncConfig) -> Result<HeaderMap, SyncError> {
    let mut headers = HeaderMap::new();
    if let Some(api_key) = &config.auth.api_key {
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(api_key).map_err(|err| SyncError::Config(err.to_string()))?,
        );
    }
    if let Some(token) = &config.auth.bearer_token {
        let value = format!("Bearer {token}");
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value).map_err(|err| SyncError::Config(err.to_string()))?,
        );
    }
    Ok(headers)
}

// ============================================================================
// PUSH-CHANNEL TRANSPORT (WebSocket)
// ============================================================================

pub struct WsStreamTransport {
    url: String,
    auth_header: HeaderMap,
}

impl WsStreamTransport {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        Ok(Self {
            url: config.stream_url.clone(),
            auth_header: build_auth_headers(config)?,
        })
    }
}

#[async_trait]
impl StreamTransport for WsStreamTransport {
    async fn connect(&self) -> Result<EventStream, SyncError> {
        let mut request = Request::builder()
            .uri(self.url.clone())
            .body(())
            .map_err(|err| SyncError::Config(err.to_string()))?;
        let headers = request.headers_mut();
        for (name, value) in self.auth_header.iter() {
            headers.insert(name, value.clone());
        }

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|err| SyncError::stream(err))?;

        let events = stream.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(
                    serde_json::from_str::<StreamEnvelope>(&text)
                        .map_err(|err| SyncError::decode("stream envelope", err)),
                ),
                Ok(Message::Close(_)) => Some(Err(SyncError::stream("connection closed"))),
                Ok(_) => None,
                Err(err) => Some(Err(SyncError::stream(err))),
            }
        });
        Ok(events.boxed())
    }
}
