//! The query catalog: which HTTP route serves each key, and which shape
//! its payload must decode into.

use crate::error::SyncError;
use crate::key::{KeySegment, QueryKey};
use serde::de::DeserializeOwned;
use tradepulse_core::{Bot, Job, MarketTicker, Order, PortfolioSnapshot, Trade};

/// Decoded payload of a query, one variant per catalog shape.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Bots(Vec<Bot>),
    Bot(Box<Bot>),
    Trades(Vec<Trade>),
    Orders(Vec<Order>),
    Portfolio(Box<PortfolioSnapshot>),
    Jobs(Vec<Job>),
    Job(Box<Job>),
    Tickers(Vec<MarketTicker>),
}

/// The HTTP request that serves a query key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRoute {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl QueryRoute {
    fn plain(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    fn with_query(path: impl Into<String>, name: &str, value: &str) -> Self {
        Self {
            path: path.into(),
            query: vec![(name.to_string(), value.to_string())],
        }
    }
}

/// Map a key to its route. A key outside the catalog is a caller error,
/// surfaced as [`SyncError::UnroutableKey`] rather than a panic.
pub fn route_for(key: &QueryKey) -> Result<QueryRoute, SyncError> {
    use KeySegment::{Id, Text};

    let route = match key.segments() {
        [Text(root)] if root == "bots" => QueryRoute::plain("/api/bots"),
        [Text(root), Id(id)] if root == "bots" => QueryRoute::plain(format!("/api/bots/{id}")),
        [Text(root)] if root == "trades" => QueryRoute::plain("/api/trades"),
        [Text(root), Text(status)] if root == "trades" => {
            QueryRoute::with_query("/api/trades", "status", status)
        }
        [Text(root)] if root == "orders" => QueryRoute::plain("/api/orders"),
        [Text(root)] if root == "portfolio" => QueryRoute::plain("/api/portfolio"),
        [Text(root), Id(id)] if root == "portfolio" => {
            QueryRoute::plain(format!("/api/portfolio/{id}"))
        }
        [Text(root)] if root == "jobs" => QueryRoute::plain("/api/jobs"),
        [Text(root), Id(id)] if root == "jobs" => QueryRoute::plain(format!("/api/jobs/{id}")),
        [Text(root), Text(section), Text(symbols)] if root == "market" && section == "tickers" => {
            QueryRoute::with_query("/api/market/tickers", "symbols", symbols)
        }
        _ => {
            return Err(SyncError::UnroutableKey {
                key: key.to_string(),
            })
        }
    };
    Ok(route)
}

fn decode<T: DeserializeOwned>(key: &QueryKey, value: serde_json::Value) -> Result<T, SyncError> {
    serde_json::from_value(value).map_err(|err| SyncError::decode(key.to_string(), err))
}

/// Decode a raw response body into the shape the catalog expects for
/// `key`. A mismatch is a [`SyncError::Decode`], treated the same as a
/// transport failure by callers: the payload is never trusted past here.
pub fn decode_payload(key: &QueryKey, value: serde_json::Value) -> Result<QueryData, SyncError> {
    use KeySegment::{Id, Text};

    match key.segments() {
        [Text(root)] if root == "bots" => Ok(QueryData::Bots(decode(key, value)?)),
        [Text(root), Id(_)] if root == "bots" => Ok(QueryData::Bot(Box::new(decode(key, value)?))),
        [Text(root), ..] if root == "trades" => Ok(QueryData::Trades(decode(key, value)?)),
        [Text(root)] if root == "orders" => Ok(QueryData::Orders(decode(key, value)?)),
        [Text(root), ..] if root == "portfolio" => {
            Ok(QueryData::Portfolio(Box::new(decode(key, value)?)))
        }
        [Text(root)] if root == "jobs" => Ok(QueryData::Jobs(decode(key, value)?)),
        [Text(root), Id(_)] if root == "jobs" => Ok(QueryData::Job(Box::new(decode(key, value)?))),
        [Text(root), ..] if root == "market" => Ok(QueryData::Tickers(decode(key, value)?)),
        _ => Err(SyncError::UnroutableKey {
            key: key.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::keys;
    use serde_json::json;

    #[test]
    fn routes_match_the_catalog() {
        assert_eq!(route_for(&keys::bots()).unwrap().path, "/api/bots");
        assert_eq!(route_for(&keys::bot(7.into())).unwrap().path, "/api/bots/7");

        let trades = route_for(&keys::trades_with_status("open")).unwrap();
        assert_eq!(trades.path, "/api/trades");
        assert_eq!(trades.query, vec![("status".to_string(), "open".to_string())]);

        assert_eq!(
            route_for(&keys::bot_portfolio(3.into())).unwrap().path,
            "/api/portfolio/3"
        );

        let tickers = route_for(&keys::market_tickers("BTC/USDT,ETH/USDT")).unwrap();
        assert_eq!(tickers.path, "/api/market/tickers");
        assert_eq!(
            tickers.query,
            vec![("symbols".to_string(), "BTC/USDT,ETH/USDT".to_string())]
        );
    }

    #[test]
    fn unknown_keys_are_unroutable() {
        let key = QueryKey::new(vec!["weather".into()]);
        assert!(matches!(
            route_for(&key),
            Err(SyncError::UnroutableKey { .. })
        ));
        // A textual segment where the catalog wants an id does not route.
        let key = QueryKey::new(vec!["bots".into(), "seven".into()]);
        assert!(matches!(
            route_for(&key),
            Err(SyncError::UnroutableKey { .. })
        ));
    }

    #[test]
    fn shape_mismatch_is_a_decode_error() {
        // The bots list endpoint must produce an array.
        let result = decode_payload(&keys::bots(), json!({"not": "a list"}));
        assert!(matches!(result, Err(SyncError::Decode { .. })));
    }

    #[test]
    fn empty_list_decodes() {
        assert_eq!(
            decode_payload(&keys::trades_with_status("open"), json!([])).unwrap(),
            QueryData::Trades(Vec::new())
        );
    }
}
