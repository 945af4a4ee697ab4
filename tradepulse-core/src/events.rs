//! Push-Channel Event Types
//!
//! The platform broadcasts a named event plus a JSON payload for every
//! state change worth reacting to. Envelopes are decoded into
//! [`StreamEvent`] at the boundary; nothing downstream touches raw JSON.

use crate::{BotId, JobId, TradeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw wire form of one push event: a dotted event name and an untyped
/// payload, exactly as the platform publishes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl StreamEnvelope {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// An envelope that could not be decoded into a [`StreamEvent`].
///
/// One malformed event must never stop the stream, so this error is
/// logged and the envelope discarded; it does not propagate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventDecodeError {
    #[error("Unknown event type: {0}")]
    UnknownType(String),
    #[error("Malformed payload for {event}: {reason}")]
    MalformedPayload { event: String, reason: String },
}

/// An operator-facing notice published by the platform's worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemNotice {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub bot_id: Option<BotId>,
    #[serde(default)]
    pub job_id: Option<JobId>,
}

/// Decoded push events.
///
/// Only the ids used for invalidation routing are modeled; the cache
/// refetches the authoritative resource rather than trusting event
/// payloads as data.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A bot started, stopped, or otherwise changed state.
    BotState { bot_id: Option<BotId> },
    /// A portfolio valuation was recorded.
    PortfolioSnapshot { bot_id: Option<BotId> },
    /// A background job advanced.
    JobProgress {
        job_id: Option<JobId>,
        bot_id: Option<BotId>,
    },
    /// A trade was opened.
    TradeOpened { trade_id: Option<TradeId> },
    /// A trade's valuation or fills changed.
    TradeUpdated { trade_id: Option<TradeId> },
    /// A trade was closed.
    TradeClosed { trade_id: Option<TradeId> },
    /// Informational notice; invalidates nothing.
    SystemNotice(SystemNotice),
}

#[derive(Debug, Default, Deserialize)]
struct BotScopedPayload {
    #[serde(default)]
    bot_id: Option<BotId>,
}

#[derive(Debug, Default, Deserialize)]
struct JobScopedPayload {
    #[serde(default)]
    job_id: Option<JobId>,
    #[serde(default)]
    bot_id: Option<BotId>,
}

#[derive(Debug, Default, Deserialize)]
struct TradeScopedPayload {
    #[serde(default)]
    trade_id: Option<TradeId>,
}

fn payload<T: Default + for<'de> Deserialize<'de>>(
    envelope: &StreamEnvelope,
) -> Result<T, EventDecodeError> {
    if envelope.data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(envelope.data.clone()).map_err(|err| {
        EventDecodeError::MalformedPayload {
            event: envelope.event.clone(),
            reason: err.to_string(),
        }
    })
}

impl TryFrom<StreamEnvelope> for StreamEvent {
    type Error = EventDecodeError;

    fn try_from(envelope: StreamEnvelope) -> Result<Self, Self::Error> {
        match envelope.event.as_str() {
            "bot.state" => {
                let data: BotScopedPayload = payload(&envelope)?;
                Ok(Self::BotState {
                    bot_id: data.bot_id,
                })
            }
            "portfolio.snapshot" => {
                let data: BotScopedPayload = payload(&envelope)?;
                Ok(Self::PortfolioSnapshot {
                    bot_id: data.bot_id,
                })
            }
            "job.progress" => {
                let data: JobScopedPayload = payload(&envelope)?;
                Ok(Self::JobProgress {
                    job_id: data.job_id,
                    bot_id: data.bot_id,
                })
            }
            "trade.opened" => {
                let data: TradeScopedPayload = payload(&envelope)?;
                Ok(Self::TradeOpened {
                    trade_id: data.trade_id,
                })
            }
            "trade.updated" => {
                let data: TradeScopedPayload = payload(&envelope)?;
                Ok(Self::TradeUpdated {
                    trade_id: data.trade_id,
                })
            }
            "trade.closed" => {
                let data: TradeScopedPayload = payload(&envelope)?;
                Ok(Self::TradeClosed {
                    trade_id: data.trade_id,
                })
            }
            "system.notice" => Ok(Self::SystemNotice(payload(&envelope)?)),
            other => Err(EventDecodeError::UnknownType(other.to_string())),
        }
    }
}
