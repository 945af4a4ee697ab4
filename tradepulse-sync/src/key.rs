//! Query keys and the prefix lattice used for invalidation.

use serde::{Deserialize, Serialize};
use std::fmt;
use tradepulse_core::{BotId, JobId};

/// One segment of a query key: a resource name or filter as text, or a
/// numeric entity id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySegment {
    Text(String),
    Id(i64),
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for KeySegment {
    fn from(value: i64) -> Self {
        Self::Id(value)
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text}"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Structural identifier for a cached query: an ordered, finite sequence
/// of segments, e.g. `trades/open` or `bots/7`.
///
/// Keys form a prefix lattice: `bots` covers `bots/7`, so invalidating
/// the former also invalidates the latter. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    pub fn new(segments: Vec<KeySegment>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    /// Whether `prefix` covers this key: every segment of `prefix`
    /// equals the corresponding segment here. Every key covers itself.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        prefix.0.len() <= self.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl<S: Into<KeySegment>> FromIterator<S> for QueryKey {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Constructors for every key in the query catalog.
pub mod keys {
    use super::*;

    pub fn bots() -> QueryKey {
        QueryKey::new(vec!["bots".into()])
    }

    pub fn bot(id: BotId) -> QueryKey {
        QueryKey::new(vec!["bots".into(), id.value().into()])
    }

    pub fn trades() -> QueryKey {
        QueryKey::new(vec!["trades".into()])
    }

    pub fn trades_with_status(status: &str) -> QueryKey {
        QueryKey::new(vec!["trades".into(), status.into()])
    }

    pub fn orders() -> QueryKey {
        QueryKey::new(vec!["orders".into()])
    }

    pub fn portfolio() -> QueryKey {
        QueryKey::new(vec!["portfolio".into()])
    }

    pub fn bot_portfolio(id: BotId) -> QueryKey {
        QueryKey::new(vec!["portfolio".into(), id.value().into()])
    }

    pub fn jobs() -> QueryKey {
        QueryKey::new(vec!["jobs".into()])
    }

    pub fn job(id: JobId) -> QueryKey {
        QueryKey::new(vec!["jobs".into(), id.value().into()])
    }

    pub fn market_tickers(symbols: &str) -> QueryKey {
        QueryKey::new(vec!["market".into(), "tickers".into(), symbols.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_structural() {
        assert_eq!(keys::trades_with_status("open"), keys::trades_with_status("open"));
        assert_ne!(keys::trades_with_status("open"), keys::trades_with_status("closed"));
        // A numeric id and its textual spelling are different segments.
        assert_ne!(
            QueryKey::new(vec!["bots".into(), 7i64.into()]),
            QueryKey::new(vec!["bots".into(), "7".into()]),
        );
    }

    #[test]
    fn prefix_covers_whole_family() {
        let prefix = keys::trades();
        assert!(keys::trades().starts_with(&prefix));
        assert!(keys::trades_with_status("open").starts_with(&prefix));
        assert!(keys::trades_with_status("closed").starts_with(&prefix));
        assert!(!keys::jobs().starts_with(&prefix));
    }

    #[test]
    fn longer_prefix_never_covers_shorter_key() {
        assert!(!keys::trades().starts_with(&keys::trades_with_status("open")));
    }

    #[test]
    fn display_joins_segments() {
        assert_eq!(keys::bot(7.into()).to_string(), "bots/7");
        assert_eq!(
            keys::market_tickers("BTC/USDT").to_string(),
            "market/tickers/BTC/USDT"
        );
    }
}
