//! Market snapshot types consumed from the market-data feed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Latest top-of-book view of a single up/down market.
///
/// All prices are the probability of the Up outcome, in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Market (condition) identifier.
    pub market_id: String,
    /// Underlying asset symbol, e.g. "BTC".
    pub asset: String,
    /// CLOB token id of the Up outcome.
    pub token_id: String,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub mid_price: Decimal,
    /// Size resting at the best level.
    #[serde(default)]
    pub depth_l1: Decimal,
    /// Size resting within the top five levels.
    #[serde(default)]
    pub depth_l5: Decimal,
    /// Realized volatility of the Up price over the recent window.
    #[serde(default)]
    pub realized_volatility: Decimal,
    /// One-minute return of the underlying.
    #[serde(default)]
    pub return_1m: Decimal,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Create a snapshot from best bid/ask; the mid is derived.
    pub fn new(
        market_id: impl Into<String>,
        asset: impl Into<String>,
        token_id: impl Into<String>,
        best_bid: Decimal,
        best_ask: Decimal,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            asset: asset.into(),
            token_id: token_id.into(),
            best_bid,
            best_ask,
            mid_price: (best_bid + best_ask) / Decimal::TWO,
            depth_l1: Decimal::ZERO,
            depth_l5: Decimal::ZERO,
            realized_volatility: Decimal::ZERO,
            return_1m: Decimal::ZERO,
            timestamp: Utc::now(),
        }
    }

    pub fn with_depth(mut self, depth_l1: Decimal, depth_l5: Decimal) -> Self {
        self.depth_l1 = depth_l1;
        self.depth_l5 = depth_l5;
        self
    }

    pub fn with_volatility(mut self, realized_volatility: Decimal, return_1m: Decimal) -> Self {
        self.realized_volatility = realized_volatility;
        self.return_1m = return_1m;
        self
    }

    /// Bid/ask spread.
    pub fn spread(&self) -> Decimal {
        self.best_ask - self.best_bid
    }

    /// Depth used for impact estimates: L5 when known, otherwise L1.
    pub fn book_depth(&self) -> Decimal {
        if self.depth_l5 > Decimal::ZERO {
            self.depth_l5
        } else {
            self.depth_l1
        }
    }

    /// Reject crossed or out-of-range books.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        let in_range = |p: Decimal| p >= Decimal::ZERO && p <= Decimal::ONE;
        if !in_range(self.best_bid) || !in_range(self.best_ask) {
            return Err(Error::InvalidMarket(format!(
                "{}: prices outside [0, 1] (bid {}, ask {})",
                self.market_id, self.best_bid, self.best_ask
            )));
        }
        if self.best_bid > self.best_ask {
            return Err(Error::InvalidMarket(format!(
                "{}: crossed book (bid {} > ask {})",
                self.market_id, self.best_bid, self.best_ask
            )));
        }
        if self.mid_price < self.best_bid || self.mid_price > self.best_ask {
            return Err(Error::InvalidMarket(format!(
                "{}: mid price {} outside [bid {}, ask {}]",
                self.market_id, self.mid_price, self.best_bid, self.best_ask
            )));
        }
        if self.mid_price <= Decimal::ZERO || self.mid_price >= Decimal::ONE {
            return Err(Error::InvalidMarket(format!(
                "{}: mid price {} outside (0, 1)",
                self.market_id, self.mid_price
            )));
        }
        Ok(())
    }
}
