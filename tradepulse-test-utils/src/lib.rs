//! Tradepulse Test Utilities
//!
//! Centralized test infrastructure for the Tradepulse workspace:
//! - Mock HTTP transport with scripted responses and recorded calls
//! - Scripted push-stream transport for reconnect scenarios
//! - Entity fixtures for common shapes

// Re-export core types for convenience
pub use tradepulse_core::{
    Bot, BotId, BotStartResponse, BotStopResponse, CreateBotRequest, Job, JobId, Knobs,
    MarketTicker, Order, OrderId, PlaceOrderRequest, PortfolioSnapshot, StreamEnvelope,
    StreamEvent, SystemNotice, Timestamp, Trade, TradeId,
};
pub use tradepulse_sync::{
    AuthConfig, EventStream, HttpTransport, ReconnectConfig, RetryConfig, StreamTransport,
    SyncConfig, SyncError,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

// ============================================================================
// MOCK HTTP TRANSPORT
// ============================================================================

/// One scripted reply for the mock HTTP transport.
#[derive(Debug, Clone)]
pub struct MockResponse {
    result: Result<serde_json::Value, SyncError>,
    delay: Option<Duration>,
}

impl MockResponse {
    pub fn ok(value: serde_json::Value) -> Self {
        Self {
            result: Ok(value),
            delay: None,
        }
    }

    pub fn err(error: SyncError) -> Self {
        Self {
            result: Err(error),
            delay: None,
        }
    }

    /// Hold the reply for `delay` before settling; the call is recorded
    /// immediately, which is what generation-ordering tests need.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// One request as the mock transport saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

#[derive(Default)]
struct MockHttpInner {
    queued: HashMap<String, VecDeque<MockResponse>>,
    sticky: HashMap<String, MockResponse>,
    calls: Vec<RecordedCall>,
}

/// Scriptable [`HttpTransport`]: responses are keyed by `METHOD path`,
/// queued replies are consumed in order, and a sticky reply answers
/// once the queue for its route is empty.
#[derive(Default)]
pub struct MockHttpTransport {
    inner: Mutex<MockHttpInner>,
}

impl MockHttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every `GET path` with `value` (unless a queued reply is
    /// pending for the same route).
    pub fn respond_get(&self, path: &str, value: serde_json::Value) {
        self.inner
            .lock()
            .sticky
            .insert(route_key("GET", path), MockResponse::ok(value));
    }

    pub fn respond_post(&self, path: &str, value: serde_json::Value) {
        self.inner
            .lock()
            .sticky
            .insert(route_key("POST", path), MockResponse::ok(value));
    }

    /// Queue one reply for `GET path`, consumed before any sticky reply.
    pub fn enqueue_get(&self, path: &str, response: MockResponse) {
        self.inner
            .lock()
            .queued
            .entry(route_key("GET", path))
            .or_default()
            .push_back(response);
    }

    pub fn enqueue_post(&self, path: &str, response: MockResponse) {
        self.inner
            .lock()
            .queued
            .entry(route_key("POST", path))
            .or_default()
            .push_back(response);
    }

    /// Every request seen so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().calls.clone()
    }

    /// How many requests hit `METHOD path`.
    pub fn call_count(&self, method: &str, path: &str) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .count()
    }

    fn take_response(&self, method: &'static str, call: RecordedCall) -> MockResponse {
        let key = route_key(method, &call.path);
        let mut inner = self.inner.lock();
        inner.calls.push(call);
        if let Some(response) = inner.queued.get_mut(&key).and_then(VecDeque::pop_front) {
            return response;
        }
        if let Some(response) = inner.sticky.get(&key) {
            return response.clone();
        }
        MockResponse::err(SyncError::Transport {
            message: format!("no mock response for {key}"),
        })
    }
}

fn route_key(method: &str, path: &str) -> String {
    format!("{method} {path}")
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn get_json(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<serde_json::Value, SyncError> {
        let response = self.take_response(
            "GET",
            RecordedCall {
                method: "GET",
                path: path.to_string(),
                query: query.to_vec(),
                body: None,
            },
        );
        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        response.result
    }

    async fn post_json(
        &self,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, SyncError> {
        let response = self.take_response(
            "POST",
            RecordedCall {
                method: "POST",
                path: path.to_string(),
                query: Vec::new(),
                body: body.cloned(),
            },
        );
        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        response.result
    }
}

// ============================================================================
// MOCK STREAM TRANSPORT
// ============================================================================

type ScriptedItem = Result<StreamEnvelope, SyncError>;

/// Scriptable [`StreamTransport`]: each `connect` call takes the next
/// scripted connection. With the script exhausted, `connect` never
/// resolves, parking the manager in `Connecting`.
#[derive(Default)]
pub struct MockStreamTransport {
    connections: Mutex<VecDeque<EventStream>>,
}

impl MockStreamTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a connection that delivers `events` and then closes,
    /// which the manager treats as a disconnect.
    pub fn script_connection(&self, events: Vec<ScriptedItem>) {
        self.connections
            .lock()
            .push_back(tokio_stream::iter(events).boxed());
    }

    /// Script a connection that stays open for as long as the returned
    /// sender lives. Dropping the sender closes the connection.
    pub fn script_live_connection(&self) -> mpsc::UnboundedSender<ScriptedItem> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.connections
            .lock()
            .push_back(UnboundedReceiverStream::new(receiver).boxed());
        sender
    }
}

#[async_trait]
impl StreamTransport for MockStreamTransport {
    async fn connect(&self) -> Result<EventStream, SyncError> {
        let next = self.connections.lock().pop_front();
        match next {
            Some(stream) => Ok(stream),
            None => futures_util::future::pending().await,
        }
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A fixed timestamp so fixture equality is stable across a test.
pub fn fixed_timestamp() -> Timestamp {
    DateTime::parse_from_rfc3339("2026-02-23T12:00:00Z")
        .expect("fixture timestamp parses")
        .with_timezone(&Utc)
}

pub fn knobs() -> Knobs {
    Knobs {
        max_open_trades: 3,
        stake_amount: 100.0,
        stop_loss_pct: 5.0,
        take_profit_pct: 10.0,
        cooldown_minutes: 60,
    }
}

pub fn bot(id: i64) -> Bot {
    Bot {
        id: BotId::new(id),
        name: format!("bot-{id}"),
        symbols: vec!["BTC/USDT".to_string()],
        timeframe: "1h".to_string(),
        paper_mode: true,
        strategy: "momentum".to_string(),
        knobs: knobs(),
        status: "stopped".to_string(),
        stop_requested: false,
        created_at: fixed_timestamp(),
        updated_at: fixed_timestamp(),
    }
}

pub fn trade(id: i64, status: &str) -> Trade {
    Trade {
        id: TradeId::new(id),
        bot_id: Some(BotId::new(1)),
        symbol: "BTC/USDT".to_string(),
        side: "buy".to_string(),
        amount: 0.5,
        price: 50_000.0,
        cost_basis_quote: 25_000.0,
        fees_paid_quote: 12.5,
        unrealized_pnl_quote: None,
        realized_pnl_quote: None,
        status: status.to_string(),
        pnl: None,
        closed_at: None,
        created_at: fixed_timestamp(),
    }
}

pub fn order(id: i64) -> Order {
    Order {
        id: OrderId::new(id),
        bot_id: Some(BotId::new(1)),
        trade_id: Some(TradeId::new(1)),
        exchange_id: None,
        symbol: "BTC/USDT".to_string(),
        side: "buy".to_string(),
        order_type: "market".to_string(),
        amount: 0.5,
        quote_amount: Some(25_000.0),
        base_qty: None,
        price: Some(50_000.0),
        fee_quote: 12.5,
        paper_mode: true,
        status: "filled".to_string(),
        created_at: fixed_timestamp(),
    }
}

pub fn portfolio_snapshot() -> PortfolioSnapshot {
    PortfolioSnapshot {
        id: 1.into(),
        bot_id: None,
        equity: 10_000.0,
        cash: 7_500.0,
        positions_value: 2_500.0,
        timestamp: fixed_timestamp(),
    }
}

pub fn job(id: i64) -> Job {
    Job {
        id: JobId::new(id),
        bot_id: Some(BotId::new(1)),
        task: "bot_run_loop".to_string(),
        status: "running".to_string(),
        progress: 40,
        message: None,
        celery_task_id: Some("celery-task".to_string()),
        created_at: fixed_timestamp(),
        updated_at: fixed_timestamp(),
    }
}

pub fn ticker(symbol: &str) -> MarketTicker {
    MarketTicker {
        symbol: symbol.to_string(),
        price: 50_000.0,
        change_24h: Some(1.5),
        timestamp: Some(1_771_848_000_000),
    }
}

/// Serialize a fixture into the JSON a mock response needs.
pub fn to_json<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).expect("fixture serializes")
}

/// A valid sync config pointed at nowhere, for transport-mocked tests.
pub fn base_config() -> SyncConfig {
    SyncConfig {
        api_base_url: "http://localhost:8000".to_string(),
        stream_url: "ws://localhost:8000/api/events".to_string(),
        auth: AuthConfig {
            api_key: Some("test-key".to_string()),
            bearer_token: None,
        },
        request_timeout_ms: 5_000,
        retry: RetryConfig {
            max_attempts: 3,
            initial_ms: 5,
            max_ms: 40,
            multiplier: 2.0,
            jitter_ms: 0,
        },
        reconnect: ReconnectConfig {
            initial_ms: 5,
            max_ms: 40,
            multiplier: 1.5,
            jitter_ms: 0,
        },
    }
}
