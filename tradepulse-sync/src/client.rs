//! The composition root: one `SyncClient` per running dashboard.

use crate::backoff::BackoffPolicy;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::invalidation::InvalidationDispatcher;
use crate::key::QueryKey;
use crate::mutation::MutationExecutor;
use crate::query::QueryExecutor;
use crate::realtime::{spawn_stream_manager, ConnectionState};
use crate::store::{CacheStore, EntrySnapshot, SubscriberId};
use crate::transport::{HttpTransport, RestTransport, StreamTransport, WsStreamTransport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tradepulse_core::SystemNotice;

/// Options for one subscription.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeOptions {
    /// Refetch on this interval for as long as the subscription lives.
    pub poll_interval: Option<Duration>,
}

/// A live subscription to one query key.
///
/// Dropping it unsubscribes and cancels the polling timer; an in-flight
/// fetch is left to settle on its own, guarded by the generation check.
pub struct Subscription {
    id: SubscriberId,
    key: QueryKey,
    store: Arc<CacheStore>,
    updates: mpsc::UnboundedReceiver<EntrySnapshot>,
    poll_task: Option<tokio::task::JoinHandle<()>>,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Wait for the next change notification on this key.
    pub async fn next_update(&mut self) -> Option<EntrySnapshot> {
        self.updates.recv().await
    }

    /// Drain any notification already delivered, without waiting.
    pub fn try_update(&mut self) -> Option<EntrySnapshot> {
        self.updates.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        self.store.unsubscribe(&self.key, self.id);
    }
}

/// A cache of server-derived data kept consistent through pull fetches,
/// push-driven invalidation, and write-through mutation side effects.
///
/// Construct one at the composition root and hand it to every view that
/// needs data; a fresh instance per test keeps tests independent.
pub struct SyncClient {
    store: Arc<CacheStore>,
    queries: QueryExecutor,
    mutations: MutationExecutor,
    state_rx: watch::Receiver<ConnectionState>,
    notice_rx: Mutex<Option<mpsc::UnboundedReceiver<SystemNotice>>>,
    stream_task: tokio::task::JoinHandle<()>,
}

impl SyncClient {
    /// Build a client against the real platform endpoints.
    pub fn connect(config: SyncConfig) -> Result<Self, SyncError> {
        config
            .validate()
            .map_err(|err| SyncError::Config(err.to_string()))?;
        let http: Arc<dyn HttpTransport> = Arc::new(RestTransport::new(&config)?);
        let stream: Arc<dyn StreamTransport> = Arc::new(WsStreamTransport::new(&config)?);
        Ok(Self::with_transports(config, http, stream))
    }

    /// Build a client over explicit transports. This is the seam the
    /// tests use to run the whole stack without a network.
    pub fn with_transports(
        config: SyncConfig,
        http: Arc<dyn HttpTransport>,
        stream: Arc<dyn StreamTransport>,
    ) -> Self {
        let store = Arc::new(CacheStore::new());
        let queries = QueryExecutor::new(Arc::clone(&store), Arc::clone(&http), config.retry.clone());
        let dispatcher = InvalidationDispatcher::new(Arc::clone(&store), queries.clone());
        let mutations = MutationExecutor::new(http, dispatcher.clone());

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let stream_task = spawn_stream_manager(
            stream,
            dispatcher,
            BackoffPolicy::from(&config.reconnect),
            state_tx,
            notice_tx,
        );

        Self {
            store,
            queries,
            mutations,
            state_rx,
            notice_rx: Mutex::new(Some(notice_rx)),
            stream_task,
        }
    }

    /// Subscribe to a key, requesting a fetch when the entry is empty
    /// or stale.
    pub fn subscribe(&self, key: QueryKey) -> Subscription {
        self.subscribe_with(key, SubscribeOptions::default())
    }

    pub fn subscribe_with(&self, key: QueryKey, options: SubscribeOptions) -> Subscription {
        let (sender, updates) = mpsc::unbounded_channel();
        let (id, needs_fetch) = self.store.subscribe(&key, sender);
        if needs_fetch {
            let queries = self.queries.clone();
            let fetch_key = key.clone();
            tokio::spawn(async move {
                // Re-checks freshness at execution time: another
                // subscriber's fetch may have settled since the
                // decision above was made.
                queries.ensure_fresh_if_stale(&fetch_key).await;
            });
        }
        let poll_task = options
            .poll_interval
            .map(|every| self.queries.spawn_poller(key.clone(), every));

        Subscription {
            id,
            key,
            store: Arc::clone(&self.store),
            updates,
            poll_task,
        }
    }

    /// Current state of a key without subscribing.
    pub fn entry(&self, key: &QueryKey) -> EntrySnapshot {
        self.store.snapshot(key)
    }

    /// Force a fetch for `key` now (or join the one in flight).
    pub async fn refresh(&self, key: &QueryKey) {
        self.queries.ensure_fresh(key).await;
    }

    /// Write operations.
    pub fn mutations(&self) -> &MutationExecutor {
        &self.mutations
    }

    /// Watch the push channel's readiness; `Reconnecting` is the
    /// "degraded connectivity" indicator views may surface.
    pub fn connection(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Take the receiver for operator-facing notices. Yields `None`
    /// after the first call: there is exactly one notice consumer.
    pub fn take_notices(&self) -> Option<mpsc::UnboundedReceiver<SystemNotice>> {
        self.notice_rx.lock().take()
    }

    /// Direct access to the cache store, for advanced callers and
    /// tests.
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.stream_task.abort();
    }
}
