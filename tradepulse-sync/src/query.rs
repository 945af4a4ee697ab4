//! The query executor: deduplicated, retried fetches that settle into
//! the cache store.

use crate::backoff::{BackoffPolicy, BackoffState};
use crate::catalog::{decode_payload, route_for, QueryData};
use crate::config::RetryConfig;
use crate::error::SyncError;
use crate::key::QueryKey;
use crate::store::{CacheStore, QueryStatus};
use crate::transport::HttpTransport;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

type InflightMap = Arc<Mutex<HashMap<QueryKey, Shared<BoxFuture<'static, ()>>>>>;

/// Resolves "is this key fresh enough" into at most one network fetch
/// per key at a time, writing every settlement back into the store.
///
/// Cheap to clone: clones share the store, transport, and the
/// single-flight table.
#[derive(Clone)]
pub struct QueryExecutor {
    store: Arc<CacheStore>,
    http: Arc<dyn HttpTransport>,
    retry: RetryConfig,
    inflight: InflightMap,
}

impl QueryExecutor {
    pub fn new(store: Arc<CacheStore>, http: Arc<dyn HttpTransport>, retry: RetryConfig) -> Self {
        Self {
            store,
            http,
            retry,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetch `key` now, or join the fetch already in flight for it.
    ///
    /// Completion means the fetch settled, successfully or not, and
    /// the store was updated. Failures are never thrown here: they land
    /// in the entry's error slot where subscribers can see them.
    pub async fn ensure_fresh(&self, key: &QueryKey) {
        if let Some(operation) = self.join_or_start(key, false) {
            operation.await;
        }
    }

    /// Like [`ensure_fresh`](Self::ensure_fresh), but a no-op when the
    /// entry is already fresh (or settled in error, which only an
    /// invalidation clears).
    ///
    /// The subscribe path uses this: its fetch decision is made when
    /// the subscription registers, and a fetch that settled in between
    /// must not be repeated.
    pub async fn ensure_fresh_if_stale(&self, key: &QueryKey) {
        if let Some(operation) = self.join_or_start(key, true) {
            operation.await;
        }
    }

    /// Refetch `key` every `every` until the returned task is aborted.
    ///
    /// The caller owns the handle; dropping the owning subscription
    /// aborts the timer (in-flight fetches are left to settle on their
    /// own, guarded by the generation check).
    pub fn spawn_poller(&self, key: QueryKey, every: Duration) -> tokio::task::JoinHandle<()> {
        let executor = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; the subscribe path has
            // already requested the initial fetch.
            interval.tick().await;
            loop {
                interval.tick().await;
                executor.ensure_fresh(&key).await;
            }
        })
    }

    fn join_or_start(
        &self,
        key: &QueryKey,
        only_if_stale: bool,
    ) -> Option<Shared<BoxFuture<'static, ()>>> {
        let mut inflight = self.inflight.lock();
        if let Some(operation) = inflight.get(key) {
            return Some(operation.clone());
        }
        if only_if_stale {
            let status = self.store.snapshot(key).status;
            if !matches!(status, QueryStatus::Empty | QueryStatus::Stale) {
                return None;
            }
        }

        let generation = self.store.begin_fetch(key);
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let store = Arc::clone(&self.store);
        let http = Arc::clone(&self.http);
        let retry = self.retry.clone();
        let inflight_map = Arc::clone(&self.inflight);
        let fetch_key = key.clone();
        tokio::spawn(async move {
            let outcome = fetch_with_retry(http.as_ref(), &retry, &fetch_key).await;
            store.write(&fetch_key, generation, outcome);
            inflight_map.lock().remove(&fetch_key);
            let _ = done_tx.send(());
        });

        let operation = done_rx.map(|_| ()).boxed().shared();
        inflight.insert(key.clone(), operation.clone());
        Some(operation)
    }
}

async fn fetch_with_retry(
    http: &dyn HttpTransport,
    retry: &RetryConfig,
    key: &QueryKey,
) -> Result<QueryData, SyncError> {
    let route = route_for(key)?;
    let mut backoff = BackoffState::new(BackoffPolicy::from(retry));
    let mut attempt = 1u32;
    loop {
        match http.get_json(&route.path, &route.query).await {
            Ok(value) => return decode_payload(key, value),
            Err(err) if err.is_transient() && attempt < retry.max_attempts => {
                let delay = backoff.next_delay();
                tracing::debug!(key = %key, attempt, delay_ms = delay.as_millis() as u64,
                    error = %err, "query fetch failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::debug!(key = %key, attempt, error = %err, "query fetch settled in error");
                return Err(err);
            }
        }
    }
}
