//! Domain and Request/Response Types
//!
//! Entity shapes mirror what the platform API serializes. Responses are
//! decoded strictly into these types before anything else is allowed to
//! look at them; request types validate locally before any network call.

use crate::error::ValidationError;
use crate::{BotId, JobId, OrderId, PortfolioId, Timestamp, TradeId};
use serde::{Deserialize, Serialize};

// ============================================================================
// BOT TYPES
// ============================================================================

/// Strategy tuning knobs attached to every bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knobs {
    /// Maximum number of simultaneously open trades (1..=100).
    pub max_open_trades: i32,
    /// Stake per trade in quote currency, must be positive.
    pub stake_amount: f64,
    /// Stop-loss threshold in percent, exclusive range (0, 100).
    pub stop_loss_pct: f64,
    /// Take-profit threshold in percent, exclusive range (0, 100).
    pub take_profit_pct: f64,
    /// Cooldown between entries for one symbol, 0..=1440 minutes.
    pub cooldown_minutes: i32,
}

impl Knobs {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=100).contains(&self.max_open_trades) {
            return Err(ValidationError::invalid(
                "knobs.max_open_trades",
                "must be between 1 and 100",
            ));
        }
        if self.stake_amount <= 0.0 {
            return Err(ValidationError::invalid(
                "knobs.stake_amount",
                "must be > 0",
            ));
        }
        if self.stop_loss_pct <= 0.0 || self.stop_loss_pct >= 100.0 {
            return Err(ValidationError::invalid(
                "knobs.stop_loss_pct",
                "must be between 0 and 100 exclusive",
            ));
        }
        if self.take_profit_pct <= 0.0 || self.take_profit_pct >= 100.0 {
            return Err(ValidationError::invalid(
                "knobs.take_profit_pct",
                "must be between 0 and 100 exclusive",
            ));
        }
        if !(0..=1440).contains(&self.cooldown_minutes) {
            return Err(ValidationError::invalid(
                "knobs.cooldown_minutes",
                "must be between 0 and 1440",
            ));
        }
        Ok(())
    }
}

/// A trading bot as the platform reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    pub id: BotId,
    pub name: String,
    /// Symbols the bot trades, each in `BASE/QUOTE` form.
    pub symbols: Vec<String>,
    pub timeframe: String,
    /// Always true on this platform; live trading is not exposed here.
    pub paper_mode: bool,
    pub strategy: String,
    pub knobs: Knobs,
    pub status: String,
    pub stop_requested: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Request to create a new bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateBotRequest {
    pub name: String,
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub paper_mode: bool,
    /// Optional strategy name; blank collapses to none and the server
    /// picks its default.
    pub strategy: Option<String>,
    pub knobs: Knobs,
}

impl CreateBotRequest {
    /// Validate and normalize the request: symbols are trimmed and
    /// uppercased, a blank strategy collapses to `None`.
    pub fn normalized(&self) -> Result<Self, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() || name.len() > 120 {
            return Err(ValidationError::invalid(
                "name",
                "must be 1 to 120 characters",
            ));
        }

        let symbols = normalize_symbols(&self.symbols)?;

        let timeframe = self.timeframe.trim();
        if timeframe.is_empty() || timeframe.len() > 20 {
            return Err(ValidationError::invalid(
                "timeframe",
                "must be 1 to 20 characters",
            ));
        }

        if !self.paper_mode {
            return Err(ValidationError::invalid(
                "paper_mode",
                "only paper trading is supported",
            ));
        }

        let strategy = self
            .strategy
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(strategy) = strategy {
            if strategy.len() > 120 {
                return Err(ValidationError::invalid(
                    "strategy",
                    "must be at most 120 characters",
                ));
            }
        }

        self.knobs.validate()?;

        Ok(Self {
            name: name.to_string(),
            symbols,
            timeframe: timeframe.to_string(),
            paper_mode: true,
            strategy: strategy.map(str::to_string),
            knobs: self.knobs.clone(),
        })
    }
}

/// Request to replace a bot's knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateKnobsRequest {
    pub knobs: Knobs,
}

impl UpdateKnobsRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.knobs.validate()
    }
}

/// Response to a start-bot command: the queued run-loop job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotStartResponse {
    pub bot_id: BotId,
    pub job_id: JobId,
    pub task_id: Option<String>,
    pub status: String,
}

/// Response to a stop-bot command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotStopResponse {
    pub bot_id: BotId,
    pub stop_requested: bool,
    pub status: String,
}

// ============================================================================
// TRADE / ORDER TYPES
// ============================================================================

/// An open or closed position held by a bot (or placed manually).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub bot_id: Option<BotId>,
    pub symbol: String,
    pub side: String,
    pub amount: f64,
    pub price: f64,
    pub cost_basis_quote: f64,
    pub fees_paid_quote: f64,
    #[serde(default)]
    pub unrealized_pnl_quote: Option<f64>,
    #[serde(default)]
    pub realized_pnl_quote: Option<f64>,
    pub status: String,
    pub pnl: Option<f64>,
    #[serde(default)]
    pub closed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Which side of the book an order sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order execution style. Only market orders exist on this platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
}

/// An exchange order as the platform reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub bot_id: Option<BotId>,
    #[serde(default)]
    pub trade_id: Option<TradeId>,
    pub exchange_id: Option<String>,
    pub symbol: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub amount: f64,
    #[serde(default)]
    pub quote_amount: Option<f64>,
    #[serde(default)]
    pub base_qty: Option<f64>,
    pub price: Option<f64>,
    pub fee_quote: f64,
    pub paper_mode: bool,
    pub status: String,
    pub created_at: Timestamp,
}

/// Request to place a manual market order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub bot_id: Option<BotId>,
    pub symbol: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Spend this much quote currency. Mutually exclusive with `base_qty`.
    #[serde(default)]
    pub quote_amount: Option<f64>,
    /// Buy/sell this much base currency. Mutually exclusive with
    /// `quote_amount`.
    #[serde(default)]
    pub base_qty: Option<f64>,
    #[serde(default)]
    pub paper_mode: Option<bool>,
}

impl PlaceOrderRequest {
    /// Validate and normalize: the symbol is trimmed and uppercased and
    /// exactly one sizing field must be present.
    pub fn normalized(&self) -> Result<Self, ValidationError> {
        let symbol = normalize_symbol(&self.symbol)?;

        match (self.quote_amount, self.base_qty) {
            (None, None) => {
                return Err(ValidationError::invalid(
                    "quote_amount",
                    "either quote_amount or base_qty is required",
                ));
            }
            (Some(_), Some(_)) => {
                return Err(ValidationError::invalid(
                    "quote_amount",
                    "quote_amount and base_qty are mutually exclusive",
                ));
            }
            _ => {}
        }
        if let Some(amount) = self.quote_amount {
            if amount <= 0.0 {
                return Err(ValidationError::invalid("quote_amount", "must be > 0"));
            }
        }
        if let Some(qty) = self.base_qty {
            if qty <= 0.0 {
                return Err(ValidationError::invalid("base_qty", "must be > 0"));
            }
        }

        Ok(Self {
            symbol,
            ..self.clone()
        })
    }
}

/// Response to a manual order: the recorded order plus the trade it
/// opened or affected, when the fill created one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderExecutionResponse {
    pub order: Order,
    #[serde(default)]
    pub trade_id: Option<TradeId>,
}

/// Response to closing a trade: the settled trade and the closing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeCloseResponse {
    pub trade: Trade,
    pub order: Order,
}

// ============================================================================
// PORTFOLIO / JOB / MARKET TYPES
// ============================================================================

/// A point-in-time portfolio valuation, global or per bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub id: PortfolioId,
    pub bot_id: Option<BotId>,
    pub equity: f64,
    pub cash: f64,
    pub positions_value: f64,
    pub timestamp: Timestamp,
}

/// A background job driven by the platform's worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub bot_id: Option<BotId>,
    pub task: String,
    pub status: String,
    pub progress: i32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub celery_task_id: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A market ticker quote for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTicker {
    pub symbol: String,
    pub price: f64,
    #[serde(default)]
    pub change_24h: Option<f64>,
    /// Exchange-side epoch millis, when the venue reports one.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

// ============================================================================
// HELPERS
// ============================================================================

fn normalize_symbol(raw: &str) -> Result<String, ValidationError> {
    let symbol = raw.trim().to_uppercase();
    if symbol.len() < 3 || symbol.len() > 30 {
        return Err(ValidationError::invalid(
            "symbol",
            "must be 3 to 30 characters",
        ));
    }
    if !symbol.contains('/') {
        return Err(ValidationError::invalid(
            "symbol",
            "must be BASE/QUOTE, e.g. BTC/USDT",
        ));
    }
    Ok(symbol)
}

fn normalize_symbols(raw: &[String]) -> Result<Vec<String>, ValidationError> {
    let mut symbols = Vec::with_capacity(raw.len());
    for symbol in raw {
        if symbol.trim().is_empty() {
            continue;
        }
        symbols.push(normalize_symbol(symbol).map_err(|_| {
            ValidationError::invalid("symbols", format!("invalid symbol: {symbol}"))
        })?);
    }
    if symbols.is_empty() {
        return Err(ValidationError::invalid(
            "symbols",
            "at least one symbol is required",
        ));
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knobs() -> Knobs {
        Knobs {
            max_open_trades: 3,
            stake_amount: 100.0,
            stop_loss_pct: 5.0,
            take_profit_pct: 10.0,
            cooldown_minutes: 60,
        }
    }

    fn create_request() -> CreateBotRequest {
        CreateBotRequest {
            name: "Scalper".to_string(),
            symbols: vec!["btc/usdt".to_string(), " eth/usdt ".to_string()],
            timeframe: "1h".to_string(),
            paper_mode: true,
            strategy: Some("momentum".to_string()),
            knobs: knobs(),
        }
    }

    #[test]
    fn create_bot_normalizes_symbols() {
        let normalized = create_request().normalized().unwrap();
        assert_eq!(normalized.symbols, vec!["BTC/USDT", "ETH/USDT"]);
    }

    #[test]
    fn create_bot_rejects_symbols_without_separator() {
        let mut request = create_request();
        request.symbols = vec!["BTCUSDT".to_string()];
        assert!(request.normalized().is_err());
    }

    #[test]
    fn create_bot_rejects_empty_symbol_list() {
        let mut request = create_request();
        request.symbols = vec!["  ".to_string()];
        assert!(request.normalized().is_err());
    }

    #[test]
    fn create_bot_rejects_live_mode() {
        let mut request = create_request();
        request.paper_mode = false;
        assert!(request.normalized().is_err());
    }

    #[test]
    fn blank_strategy_collapses_to_none() {
        let mut request = create_request();
        request.strategy = Some("   ".to_string());
        assert_eq!(request.normalized().unwrap().strategy, None);
    }

    #[test]
    fn knobs_ranges_are_enforced() {
        let mut bad = knobs();
        bad.max_open_trades = 0;
        assert!(bad.validate().is_err());

        let mut bad = knobs();
        bad.stop_loss_pct = 100.0;
        assert!(bad.validate().is_err());

        let mut bad = knobs();
        bad.cooldown_minutes = 2000;
        assert!(bad.validate().is_err());

        assert!(knobs().validate().is_ok());
    }

    #[test]
    fn order_requires_exactly_one_sizing_field() {
        let base = PlaceOrderRequest {
            bot_id: None,
            symbol: "btc/usdt".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quote_amount: Some(50.0),
            base_qty: None,
            paper_mode: None,
        };
        let normalized = base.normalized().unwrap();
        assert_eq!(normalized.symbol, "BTC/USDT");

        let mut both = base.clone();
        both.base_qty = Some(0.1);
        assert!(both.normalized().is_err());

        let mut neither = base.clone();
        neither.quote_amount = None;
        assert!(neither.normalized().is_err());

        let mut negative = base;
        negative.quote_amount = Some(-1.0);
        assert!(negative.normalized().is_err());
    }

    #[test]
    fn trade_decodes_with_nullable_fields() {
        let json = serde_json::json!({
            "id": 9,
            "bot_id": null,
            "symbol": "BTC/USDT",
            "side": "buy",
            "amount": 0.5,
            "price": 50_000.0,
            "cost_basis_quote": 25_000.0,
            "fees_paid_quote": 12.5,
            "status": "open",
            "pnl": null,
            "created_at": "2026-02-23T12:00:00Z",
        });
        let trade: Trade = serde_json::from_value(json).unwrap();
        assert_eq!(trade.id, TradeId::new(9));
        assert_eq!(trade.bot_id, None);
        assert_eq!(trade.closed_at, None);
    }
}
