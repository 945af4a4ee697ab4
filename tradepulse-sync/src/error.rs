//! Error types for the sync core.

use tradepulse_core::ValidationError;

/// Every failure the sync core can produce.
///
/// All variants carry owned strings rather than source errors so the
/// enum stays `Clone` and can live inside cache entries, where the last
/// failure is kept alongside the last good data.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SyncError {
    /// A request payload failed its local shape check; nothing was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    /// A response or event body did not match the expected shape.
    #[error("Decode error for {context}: {message}")]
    Decode { context: String, message: String },
    /// The push channel failed at the transport level.
    #[error("Stream error: {message}")]
    Stream { message: String },
    /// A connection or timeout failure; queries retry these.
    #[error("Transport error: {message}")]
    Transport { message: String },
    /// A query key with no route in the catalog.
    #[error("No route for query key: {key}")]
    UnroutableKey { key: String },
    /// Client construction failed.
    #[error("Config error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn decode(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn stream(message: impl std::fmt::Display) -> Self {
        Self::Stream {
            message: message.to_string(),
        }
    }

    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }

    /// Whether a query fetch hitting this error should retry.
    ///
    /// Only transport-level failures qualify; status and decode errors
    /// are deterministic and settle immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
