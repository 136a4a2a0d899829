//! Newline-delimited JSON input for the trader binary.

use polymarket_core::types::{Decision, MarketSnapshot};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Market expiry instruction.
#[derive(Debug, Clone, Deserialize)]
pub struct Settlement {
    pub market_id: String,
    /// 0 or 1 at resolution, or the last mid.
    pub price: Decimal,
}

/// One input line.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FeedMessage {
    Decision {
        snapshot: MarketSnapshot,
        decision: Decision,
    },
    Settle {
        settle: Settlement,
    },
}

impl FeedMessage {
    /// Market the message is routed by.
    pub fn market_id(&self) -> &str {
        match self {
            FeedMessage::Decision { snapshot, .. } => &snapshot.market_id,
            FeedMessage::Settle { settle } => &settle.market_id,
        }
    }
}

/// Parse a line; blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Option<serde_json::Result<FeedMessage>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(trimmed))
}
