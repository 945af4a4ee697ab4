//! The query cache store: the single source of mutable shared state.
//!
//! Every entry mutation goes through [`CacheStore::begin_fetch`],
//! [`CacheStore::write`] or [`CacheStore::mark_stale`], each of which
//! holds the internal lock for the whole update, so no partial state is
//! ever observable. The lock is never held across an await point.

use crate::catalog::QueryData;
use crate::error::SyncError;
use crate::key::QueryKey;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tradepulse_core::Timestamp;
use uuid::Uuid;

/// Identity of one registered subscriber.
pub type SubscriberId = Uuid;

/// Freshness state of a cache entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryStatus {
    /// Created but never fetched.
    #[default]
    Empty,
    /// A fetch is in flight.
    Loading,
    /// Holding the latest known-good data.
    Fresh,
    /// Invalidated; the data is still displayable but a refetch is due.
    Stale,
    /// The last fetch settled in an error after exhausting retries.
    Error,
}

/// Point-in-time copy of one cache entry, as handed to subscribers.
///
/// `data` survives an error settlement: the dashboard shows the last
/// good data alongside the error instead of blanking out.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub key: QueryKey,
    pub status: QueryStatus,
    pub data: Option<QueryData>,
    pub error: Option<SyncError>,
    pub last_success_at: Option<Timestamp>,
    pub generation: u64,
    pub subscriber_count: usize,
}

#[derive(Debug, Default)]
struct Entry {
    status: QueryStatus,
    data: Option<QueryData>,
    error: Option<SyncError>,
    last_success_at: Option<Timestamp>,
    generation: u64,
}

struct Subscriber {
    id: SubscriberId,
    sender: mpsc::UnboundedSender<EntrySnapshot>,
}

#[derive(Default)]
struct StoreInner {
    entries: HashMap<QueryKey, Entry>,
    /// Prefixes invalidated before any covered entry existed. Consulted
    /// when a subscription arrives for a key that was never fetched.
    pending_invalidations: Vec<QueryKey>,
    subscribers: HashMap<QueryKey, Vec<Subscriber>>,
}

/// Keyed container for the latest known value, freshness metadata and
/// subscriber registry of every logical query.
#[derive(Default)]
pub struct CacheStore {
    inner: Mutex<StoreInner>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `key`; an `Empty` snapshot if never seen.
    pub fn snapshot(&self, key: &QueryKey) -> EntrySnapshot {
        let inner = self.inner.lock();
        Self::snapshot_of(&inner, key)
    }

    /// Register a change listener for `key`.
    ///
    /// Returns the subscriber identity plus whether the caller should
    /// request a fetch: true when the entry is empty, stale, or covered
    /// by an invalidation recorded before the key existed.
    pub fn subscribe(
        &self,
        key: &QueryKey,
        sender: mpsc::UnboundedSender<EntrySnapshot>,
    ) -> (SubscriberId, bool) {
        let mut inner = self.inner.lock();
        let id = Uuid::new_v4();
        inner
            .subscribers
            .entry(key.clone())
            .or_default()
            .push(Subscriber {
                id,
                sender,
            });

        let status = inner
            .entries
            .get(key)
            .map(|e| e.status)
            .unwrap_or(QueryStatus::Empty);
        let pending = inner
            .pending_invalidations
            .iter()
            .any(|prefix| key.starts_with(prefix));
        let needs_fetch = matches!(status, QueryStatus::Empty | QueryStatus::Stale)
            || (pending && status != QueryStatus::Loading);
        (id, needs_fetch)
    }

    /// Drop one subscriber. The entry stays cached; only the listener
    /// registration and its count go away.
    pub fn unsubscribe(&self, key: &QueryKey, id: SubscriberId) {
        let mut inner = self.inner.lock();
        if let Some(subscribers) = inner.subscribers.get_mut(key) {
            subscribers.retain(|s| s.id != id);
            if subscribers.is_empty() {
                inner.subscribers.remove(key);
            }
        }
    }

    /// Start a fetch: bump the generation, mark the entry loading, and
    /// return the generation the eventual [`write`](Self::write) must
    /// carry.
    pub fn begin_fetch(&self, key: &QueryKey) -> u64 {
        let mut inner = self.inner.lock();
        inner
            .pending_invalidations
            .retain(|prefix| !key.starts_with(prefix));
        let entry = inner.entries.entry(key.clone()).or_default();
        entry.generation += 1;
        entry.status = QueryStatus::Loading;
        let generation = entry.generation;
        Self::notify(&mut inner, key);
        generation
    }

    /// Apply a settled fetch. A result whose generation no longer
    /// matches the entry's was superseded by a newer fetch and is
    /// dropped silently. Returns whether the result was applied.
    pub fn write(
        &self,
        key: &QueryKey,
        generation: u64,
        result: Result<QueryData, SyncError>,
    ) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.entries.get_mut(key) else {
            return false;
        };
        if entry.generation != generation {
            tracing::debug!(key = %key, generation, current = entry.generation,
                "dropping superseded fetch result");
            return false;
        }

        match result {
            Ok(data) => {
                entry.status = QueryStatus::Fresh;
                entry.data = Some(data);
                entry.error = None;
                entry.last_success_at = Some(Utc::now());
            }
            Err(error) => {
                tracing::debug!(key = %key, error = %error, "query settled in error");
                entry.status = QueryStatus::Error;
                entry.error = Some(error);
            }
        }
        Self::notify(&mut inner, key);
        true
    }

    /// Invalidate every entry covered by `prefix`.
    ///
    /// Fresh and error entries transition to stale and their listeners
    /// are notified; re-invalidating an already-stale entry is a no-op,
    /// which is what coalesces overlapping prefixes within one dispatch.
    /// Returns the keys that transitioned and have at least one
    /// subscriber, which is the set the dispatcher must refetch.
    pub fn mark_stale(&self, prefix: &QueryKey) -> Vec<QueryKey> {
        let mut inner = self.inner.lock();
        let covered: Vec<QueryKey> = inner
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();

        if covered.is_empty() {
            if !inner.pending_invalidations.contains(prefix) {
                inner.pending_invalidations.push(prefix.clone());
            }
            return Vec::new();
        }

        let mut refetch = Vec::new();
        for key in covered {
            let Some(entry) = inner.entries.get_mut(&key) else {
                continue;
            };
            if !matches!(entry.status, QueryStatus::Fresh | QueryStatus::Error) {
                continue;
            }
            entry.status = QueryStatus::Stale;
            Self::notify(&mut inner, &key);
            if inner.subscribers.get(&key).is_some_and(|s| !s.is_empty()) {
                refetch.push(key);
            }
        }
        refetch
    }

    /// Every key with at least one live subscriber.
    pub fn subscribed_keys(&self) -> Vec<QueryKey> {
        self.inner.lock().subscribers.keys().cloned().collect()
    }

    fn snapshot_of(inner: &StoreInner, key: &QueryKey) -> EntrySnapshot {
        let entry = inner.entries.get(key);
        EntrySnapshot {
            key: key.clone(),
            status: entry.map(|e| e.status).unwrap_or(QueryStatus::Empty),
            data: entry.and_then(|e| e.data.clone()),
            error: entry.and_then(|e| e.error.clone()),
            last_success_at: entry.and_then(|e| e.last_success_at),
            generation: entry.map(|e| e.generation).unwrap_or(0),
            subscriber_count: inner.subscribers.get(key).map_or(0, Vec::len),
        }
    }

    fn notify(inner: &mut StoreInner, key: &QueryKey) {
        let snapshot = Self::snapshot_of(inner, key);
        if let Some(subscribers) = inner.subscribers.get_mut(key) {
            // A closed receiver means the subscription guard was dropped
            // mid-update; prune it here rather than leaking the sender.
            subscribers.retain(|s| s.sender.send(snapshot.clone()).is_ok());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::keys;
    use tradepulse_core::{Bot, Knobs};

    fn sample_bots() -> QueryData {
        QueryData::Bots(vec![Bot {
            id: 1.into(),
            name: "Scalper".to_string(),
            symbols: vec!["BTC/USDT".to_string()],
            timeframe: "1h".to_string(),
            paper_mode: true,
            strategy: "momentum".to_string(),
            knobs: Knobs {
                max_open_trades: 3,
                stake_amount: 100.0,
                stop_loss_pct: 5.0,
                take_profit_pct: 10.0,
                cooldown_minutes: 60,
            },
            status: "stopped".to_string(),
            stop_requested: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }])
    }

    #[test]
    fn unseen_key_snapshots_as_empty() {
        let store = CacheStore::new();
        let snapshot = store.snapshot(&keys::bots());
        assert_eq!(snapshot.status, QueryStatus::Empty);
        assert_eq!(snapshot.generation, 0);
        assert!(snapshot.data.is_none());
    }

    #[test]
    fn fetch_lifecycle_reaches_fresh() {
        let store = CacheStore::new();
        let key = keys::bots();
        let generation = store.begin_fetch(&key);
        assert_eq!(store.snapshot(&key).status, QueryStatus::Loading);

        assert!(store.write(&key, generation, Ok(sample_bots())));
        let snapshot = store.snapshot(&key);
        assert_eq!(snapshot.status, QueryStatus::Fresh);
        assert!(snapshot.data.is_some());
        assert!(snapshot.last_success_at.is_some());
    }

    #[test]
    fn superseded_write_is_dropped() {
        let store = CacheStore::new();
        let key = keys::bots();
        let old_generation = store.begin_fetch(&key);
        let new_generation = store.begin_fetch(&key);
        assert!(new_generation > old_generation);

        assert!(store.write(&key, new_generation, Ok(sample_bots())));
        // The slow, superseded fetch settles afterwards and must not
        // clobber the newer result.
        assert!(!store.write(
            &key,
            old_generation,
            Err(SyncError::transport("late failure"))
        ));
        assert_eq!(store.snapshot(&key).status, QueryStatus::Fresh);
    }

    #[test]
    fn error_settlement_keeps_last_good_data() {
        let store = CacheStore::new();
        let key = keys::bots();
        let generation = store.begin_fetch(&key);
        store.write(&key, generation, Ok(sample_bots()));

        let generation = store.begin_fetch(&key);
        store.write(&key, generation, Err(SyncError::transport("down")));

        let snapshot = store.snapshot(&key);
        assert_eq!(snapshot.status, QueryStatus::Error);
        assert!(snapshot.data.is_some());
        assert!(snapshot.error.is_some());
    }

    #[test]
    fn mark_stale_covers_prefix_family() {
        let store = CacheStore::new();
        for key in [
            keys::trades_with_status("open"),
            keys::trades_with_status("closed"),
        ] {
            let generation = store.begin_fetch(&key);
            store.write(&key, generation, Ok(QueryData::Trades(Vec::new())));
        }
        let generation = store.begin_fetch(&keys::jobs());
        store.write(&keys::jobs(), generation, Ok(QueryData::Jobs(Vec::new())));

        store.mark_stale(&keys::trades());
        assert_eq!(
            store.snapshot(&keys::trades_with_status("open")).status,
            QueryStatus::Stale
        );
        assert_eq!(
            store.snapshot(&keys::trades_with_status("closed")).status,
            QueryStatus::Stale
        );
        assert_eq!(store.snapshot(&keys::jobs()).status, QueryStatus::Fresh);
    }

    #[test]
    fn mark_stale_is_idempotent() {
        let store = CacheStore::new();
        let key = keys::trades();
        let (tx, mut rx) = mpsc::unbounded_channel();
        store.subscribe(&key, tx);

        let generation = store.begin_fetch(&key);
        store.write(&key, generation, Ok(QueryData::Trades(Vec::new())));
        while rx.try_recv().is_ok() {}

        let first = store.mark_stale(&key);
        assert_eq!(first, vec![key.clone()]);
        assert_eq!(rx.try_recv().unwrap().status, QueryStatus::Stale);

        // Second invalidation: already stale, no transition, no notify,
        // no refetch request.
        let second = store.mark_stale(&key);
        assert!(second.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn invalidating_unknown_key_records_pending_marker() {
        let store = CacheStore::new();
        let refetch = store.mark_stale(&keys::trades());
        assert!(refetch.is_empty());

        // A later first subscription under the marked prefix must fetch.
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_, needs_fetch) = store.subscribe(&keys::trades_with_status("open"), tx);
        assert!(needs_fetch);
    }

    #[test]
    fn subscribe_to_fresh_entry_needs_no_fetch() {
        let store = CacheStore::new();
        let key = keys::bots();
        let generation = store.begin_fetch(&key);
        store.write(&key, generation, Ok(sample_bots()));

        let (tx, _rx) = mpsc::unbounded_channel();
        let (_, needs_fetch) = store.subscribe(&key, tx);
        assert!(!needs_fetch);
    }

    #[test]
    fn unsubscribe_drops_count_but_keeps_entry() {
        let store = CacheStore::new();
        let key = keys::bots();
        let generation = store.begin_fetch(&key);
        store.write(&key, generation, Ok(sample_bots()));

        let (tx, _rx) = mpsc::unbounded_channel();
        let (id, _) = store.subscribe(&key, tx);
        assert_eq!(store.snapshot(&key).subscriber_count, 1);

        store.unsubscribe(&key, id);
        let snapshot = store.snapshot(&key);
        assert_eq!(snapshot.subscriber_count, 0);
        assert_eq!(snapshot.status, QueryStatus::Fresh);
        assert!(store.subscribed_keys().is_empty());
    }

    #[test]
    fn refetch_list_only_contains_subscribed_keys() {
        let store = CacheStore::new();
        let subscribed = keys::trades_with_status("open");
        let unsubscribed = keys::trades_with_status("closed");
        for key in [&subscribed, &unsubscribed] {
            let generation = store.begin_fetch(key);
            store.write(key, generation, Ok(QueryData::Trades(Vec::new())));
        }
        let (tx, _rx) = mpsc::unbounded_channel();
        store.subscribe(&subscribed, tx);

        let refetch = store.mark_stale(&keys::trades());
        assert_eq!(refetch, vec![subscribed]);
        // The unsubscribed entry still went stale.
        assert_eq!(store.snapshot(&unsubscribed).status, QueryStatus::Stale);
    }
}
