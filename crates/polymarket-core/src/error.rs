//! Error types for the up/down trading core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Position already open for market {market_id}")]
    AlreadyOpen { market_id: String },

    #[error("No open position for market {market_id}")]
    NoOpenPosition { market_id: String },

    #[error("Position error: {0}")]
    InvalidPosition(String),

    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    #[error("Invalid market data: {0}")]
    InvalidMarket(String),

    #[error("API error: {message}")]
    Api { message: String, status: Option<u16> },

    #[error("Signing error: {message}")]
    Signing { message: String },

    #[error("Authentication error: {message}")]
    Auth { message: String },
}

impl Error {
    /// Whether this error is a broken ledger contract (duplicate open, close on flat).
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Error::AlreadyOpen { .. }
                | Error::NoOpenPosition { .. }
                | Error::InvalidPosition(_)
                | Error::InvalidDecision(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
