//! The invalidation dispatcher: the routing table and fan-out logic
//! connecting stream events and mutation outcomes to refetches.

use crate::key::{keys, QueryKey};
use crate::query::QueryExecutor;
use crate::store::CacheStore;
use std::sync::Arc;
use tradepulse_core::StreamEvent;

/// The static routing table: which key prefixes a push event
/// invalidates. Pure function of the event, trivially testable.
pub fn routes_for(event: &StreamEvent) -> Vec<QueryKey> {
    match event {
        StreamEvent::BotState { bot_id } => {
            let mut prefixes = vec![keys::bots()];
            if let Some(id) = bot_id {
                prefixes.push(keys::bot(*id));
            }
            prefixes
        }
        StreamEvent::PortfolioSnapshot { bot_id } => {
            let mut prefixes = vec![keys::portfolio()];
            if let Some(id) = bot_id {
                prefixes.push(keys::bot_portfolio(*id));
            }
            prefixes
        }
        StreamEvent::JobProgress { .. } => vec![keys::jobs()],
        StreamEvent::TradeOpened { .. }
        | StreamEvent::TradeUpdated { .. }
        | StreamEvent::TradeClosed { .. } => {
            vec![keys::trades(), keys::orders(), keys::portfolio()]
        }
        // Notices are informational; the cache has nothing to relearn.
        StreamEvent::SystemNotice(_) => Vec::new(),
    }
}

/// Fans invalidations out to the store and requests refetches for the
/// keys that still have an audience. Cheap to clone; clones share the
/// store and executor.
#[derive(Clone)]
pub struct InvalidationDispatcher {
    store: Arc<CacheStore>,
    queries: QueryExecutor,
}

impl InvalidationDispatcher {
    pub fn new(store: Arc<CacheStore>, queries: QueryExecutor) -> Self {
        Self { store, queries }
    }

    /// Apply one decoded push event.
    pub fn apply_event(&self, event: &StreamEvent) {
        let prefixes = routes_for(event);
        if prefixes.is_empty() {
            return;
        }
        tracing::debug!(?event, count = prefixes.len(), "invalidating for stream event");
        self.invalidate(&prefixes);
    }

    /// Mark every entry covered by the prefixes stale and refetch the
    /// subscribed ones. Overlapping prefixes within one call collapse
    /// to a single refetch per key.
    pub fn invalidate(&self, prefixes: &[QueryKey]) {
        let mut refetch: Vec<QueryKey> = Vec::new();
        for prefix in prefixes {
            for key in self.store.mark_stale(prefix) {
                if !refetch.contains(&key) {
                    refetch.push(key);
                }
            }
        }
        for key in refetch {
            self.request_refetch(key);
        }
    }

    /// Refetch every key with at least one subscriber, regardless of
    /// freshness. This is the backstop run on every reconnect: events
    /// missed during an outage are unrecoverable, so everything anyone
    /// is watching gets re-pulled.
    pub fn refresh_subscribed(&self) {
        let subscribed = self.store.subscribed_keys();
        tracing::debug!(count = subscribed.len(), "refreshing all subscribed keys");
        for key in subscribed {
            self.request_refetch(key);
        }
    }

    fn request_refetch(&self, key: QueryKey) {
        let queries = self.queries.clone();
        tokio::spawn(async move {
            queries.ensure_fresh(&key).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradepulse_core::SystemNotice;

    #[test]
    fn bot_state_routes_to_bot_family() {
        let event = StreamEvent::BotState {
            bot_id: Some(7.into()),
        };
        assert_eq!(routes_for(&event), vec![keys::bots(), keys::bot(7.into())]);

        let anonymous = StreamEvent::BotState { bot_id: None };
        assert_eq!(routes_for(&anonymous), vec![keys::bots()]);
    }

    #[test]
    fn portfolio_routes_narrow_when_scoped() {
        let event = StreamEvent::PortfolioSnapshot {
            bot_id: Some(3.into()),
        };
        assert_eq!(
            routes_for(&event),
            vec![keys::portfolio(), keys::bot_portfolio(3.into())]
        );
    }

    #[test]
    fn trade_events_invalidate_three_families() {
        for event in [
            StreamEvent::TradeOpened { trade_id: None },
            StreamEvent::TradeUpdated {
                trade_id: Some(1.into()),
            },
            StreamEvent::TradeClosed { trade_id: None },
        ] {
            assert_eq!(
                routes_for(&event),
                vec![keys::trades(), keys::orders(), keys::portfolio()]
            );
        }
    }

    #[test]
    fn job_progress_routes_to_jobs_only() {
        let event = StreamEvent::JobProgress {
            job_id: Some(5.into()),
            bot_id: Some(2.into()),
        };
        assert_eq!(routes_for(&event), vec![keys::jobs()]);
    }

    #[test]
    fn notices_invalidate_nothing() {
        let event = StreamEvent::SystemNotice(SystemNotice {
            message: "hello".to_string(),
            bot_id: None,
            job_id: None,
        });
        assert!(routes_for(&event).is_empty());
    }
}
