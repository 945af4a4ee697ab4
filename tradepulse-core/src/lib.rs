//! Tradepulse Core - Entity Types
//!
//! Pure data structures with no I/O. All other crates depend on this.
//! This crate contains the platform's domain entities, the request types
//! operators submit through the dashboard, and the push-event types the
//! platform broadcasts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod error;
mod events;
mod types;

pub use error::ValidationError;
pub use events::{EventDecodeError, StreamEnvelope, StreamEvent, SystemNotice};
pub use types::{
    Bot, BotStartResponse, BotStopResponse, CreateBotRequest, Job, Knobs, MarketTicker, Order,
    OrderExecutionResponse, OrderSide, OrderType, PlaceOrderRequest, PortfolioSnapshot, Trade,
    TradeCloseResponse, UpdateKnobsRequest,
};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

macro_rules! numeric_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            pub fn value(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a trading bot.
    BotId
);
numeric_id!(
    /// Identifier of a trade (an open or closed position).
    TradeId
);
numeric_id!(
    /// Identifier of an exchange order.
    OrderId
);
numeric_id!(
    /// Identifier of a background job.
    JobId
);
numeric_id!(
    /// Identifier of a portfolio snapshot row.
    PortfolioId
);
