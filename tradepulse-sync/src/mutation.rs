//! The mutation executor: write operations against the platform,
//! confirm-then-invalidate.

use crate::error::SyncError;
use crate::invalidation::InvalidationDispatcher;
use crate::key::{keys, QueryKey};
use crate::transport::HttpTransport;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tradepulse_core::{
    Bot, BotId, BotStartResponse, BotStopResponse, CreateBotRequest, OrderExecutionResponse,
    PlaceOrderRequest, TradeCloseResponse, TradeId, UpdateKnobsRequest,
};

/// Declares, statically, which key families a successful write affects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationDescriptor {
    pub path: String,
    pub invalidates: Vec<QueryKey>,
}

/// Performs write operations and, on confirmation, drives the matching
/// invalidations through the dispatcher before the caller resumes.
///
/// No optimistic application: the cache shows prior state until the
/// server confirms and the refetch completes. Failed mutations never
/// touch the cache and never auto-retry.
pub struct MutationExecutor {
    http: Arc<dyn HttpTransport>,
    dispatcher: InvalidationDispatcher,
}

impl MutationExecutor {
    pub fn new(http: Arc<dyn HttpTransport>, dispatcher: InvalidationDispatcher) -> Self {
        Self { http, dispatcher }
    }

    pub async fn create_bot(&self, request: &CreateBotRequest) -> Result<Bot, SyncError> {
        let request = request.normalized()?;
        let descriptor = MutationDescriptor {
            path: "/api/bots".to_string(),
            invalidates: vec![keys::bots()],
        };
        self.execute(descriptor, Some(to_body(&request)?)).await
    }

    pub async fn start_bot(&self, id: BotId) -> Result<BotStartResponse, SyncError> {
        let descriptor = MutationDescriptor {
            path: format!("/api/bots/{id}/start"),
            invalidates: vec![keys::bots(), keys::bot(id), keys::jobs()],
        };
        self.execute(descriptor, None).await
    }

    pub async fn stop_bot(&self, id: BotId) -> Result<BotStopResponse, SyncError> {
        let descriptor = MutationDescriptor {
            path: format!("/api/bots/{id}/stop"),
            invalidates: vec![keys::bots(), keys::bot(id), keys::jobs()],
        };
        self.execute(descriptor, None).await
    }

    pub async fn update_knobs(
        &self,
        id: BotId,
        request: &UpdateKnobsRequest,
    ) -> Result<Bot, SyncError> {
        request.validate()?;
        let descriptor = MutationDescriptor {
            path: format!("/api/bots/{id}/knobs"),
            invalidates: vec![keys::bots(), keys::bot(id)],
        };
        self.execute(descriptor, Some(to_body(request)?)).await
    }

    pub async fn place_order(
        &self,
        request: &PlaceOrderRequest,
    ) -> Result<OrderExecutionResponse, SyncError> {
        let request = request.normalized()?;
        let descriptor = MutationDescriptor {
            path: "/api/orders".to_string(),
            invalidates: vec![keys::orders(), keys::trades(), keys::portfolio()],
        };
        self.execute(descriptor, Some(to_body(&request)?)).await
    }

    pub async fn close_trade(&self, id: TradeId) -> Result<TradeCloseResponse, SyncError> {
        let descriptor = MutationDescriptor {
            path: format!("/api/trades/{id}/close"),
            invalidates: vec![keys::trades(), keys::orders(), keys::portfolio()],
        };
        self.execute(descriptor, None).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        descriptor: MutationDescriptor,
        body: Option<serde_json::Value>,
    ) -> Result<T, SyncError> {
        let raw = self.http.post_json(&descriptor.path, body.as_ref()).await?;
        let decoded: T = serde_json::from_value(raw)
            .map_err(|err| SyncError::decode(descriptor.path.clone(), err))?;

        // Invalidation runs before the caller sees the result, so code
        // acting on a confirmed mutation always observes the stale
        // marker and the queued refetch.
        tracing::debug!(path = %descriptor.path, "mutation confirmed, invalidating");
        self.dispatcher.invalidate(&descriptor.invalidates);
        Ok(decoded)
    }
}

fn to_body<T: serde::Serialize>(request: &T) -> Result<serde_json::Value, SyncError> {
    serde_json::to_value(request).map_err(|err| SyncError::decode("request body", err))
}
