//! Position types for up/down market exposure.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::OrderSide;
use crate::{Error, Result};

/// Direction of a position on an up/down market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    /// Profits when the Up probability rises.
    Up,
    /// Profits when the Up probability falls.
    Down,
}

impl PositionSide {
    /// Order side on the Up token that opens this position.
    pub fn entry_order_side(self) -> OrderSide {
        match self {
            PositionSide::Up => OrderSide::Buy,
            PositionSide::Down => OrderSide::Sell,
        }
    }

    /// Order side on the Up token that closes this position.
    pub fn exit_order_side(self) -> OrderSide {
        self.entry_order_side().opposite()
    }

    fn sign(self) -> Decimal {
        match self {
            PositionSide::Up => Decimal::ONE,
            PositionSide::Down => Decimal::NEGATIVE_ONE,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Up => write!(f, "up"),
            PositionSide::Down => write!(f, "down"),
        }
    }
}

/// Lifecycle state of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    /// Entry order not yet filled.
    Flat,
    /// Exposure held.
    Open,
    /// Exit order in flight.
    Closing,
    /// Exited; kept only in trade history.
    Closed,
}

/// An open position on one market.
///
/// `size` is notional in USD; `entry_price` is the Up probability paid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub market_id: String,
    pub asset: String,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub status: PositionStatus,
    /// Venue order id of the entry order, if live.
    pub order_id: Option<String>,
    pub fees_paid: Decimal,
    pub realized_slippage: Decimal,
    /// Realized P&L from partial exits.
    pub realized_pnl: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Create an open position.
    #[allow(clippy::result_large_err)]
    pub fn open(
        market_id: impl Into<String>,
        asset: impl Into<String>,
        side: PositionSide,
        size: Decimal,
        entry_price: Decimal,
    ) -> Result<Self> {
        let market_id = market_id.into();
        if size <= Decimal::ZERO {
            return Err(Error::InvalidPosition(format!(
                "{}: size must be positive, got {}",
                market_id, size
            )));
        }
        if entry_price <= Decimal::ZERO || entry_price >= Decimal::ONE {
            return Err(Error::InvalidPosition(format!(
                "{}: entry price {} outside (0, 1)",
                market_id, entry_price
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            market_id,
            asset: asset.into(),
            side,
            size,
            entry_price,
            entry_time: now,
            status: PositionStatus::Open,
            order_id: None,
            fees_paid: Decimal::ZERO,
            realized_slippage: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            updated_at: now,
        })
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_costs(mut self, fees: Decimal, slippage: Decimal) -> Self {
        self.fees_paid = fees;
        self.realized_slippage = slippage;
        self
    }

    /// Shares of the Up token represented by the notional.
    pub fn shares(&self) -> Decimal {
        if self.entry_price.is_zero() {
            Decimal::ZERO
        } else {
            self.size / self.entry_price
        }
    }

    /// P&L of exiting `shares` at `exit_price`.
    pub fn pnl_at(&self, exit_price: Decimal, shares: Decimal) -> Decimal {
        (exit_price - self.entry_price) * shares * self.side.sign()
    }

    /// Mark-to-market P&L of the whole position.
    pub fn unrealized_pnl(&self, mark_price: Decimal) -> Decimal {
        self.pnl_at(mark_price, self.shares())
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, PositionStatus::Open | PositionStatus::Closing)
    }

    /// Fold an additional fill into the position at a size-weighted average.
    pub fn apply_fill(&mut self, notional: Decimal, price: Decimal) {
        if notional <= Decimal::ZERO || price <= Decimal::ZERO {
            return;
        }
        let shares = self.shares() + notional / price;
        self.size += notional;
        self.entry_price = self.size / shares;
        self.updated_at = Utc::now();
    }

    /// Transition Open -> Closing.
    pub fn mark_closing(&mut self) -> std::result::Result<(), String> {
        if self.status != PositionStatus::Open {
            return Err(format!(
                "Cannot start closing from state {:?}",
                self.status
            ));
        }
        self.status = PositionStatus::Closing;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition Closing -> Open after an exit order failed to fill.
    pub fn revert_closing(&mut self) -> std::result::Result<(), String> {
        if self.status != PositionStatus::Closing {
            return Err(format!(
                "Cannot revert closing from state {:?}",
                self.status
            ));
        }
        self.status = PositionStatus::Open;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// A completed round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Unique per close; used as the idempotency key downstream.
    pub id: Uuid,
    pub position_id: Uuid,
    pub market_id: String,
    pub asset: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    /// Notional closed in USD.
    pub size: Decimal,
    pub pnl: Decimal,
    pub fees: Decimal,
    pub slippage: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
}

impl TradeRecord {
    pub fn is_loss(&self) -> bool {
        self.pnl < Decimal::ZERO
    }

    /// P&L after fees.
    pub fn net_pnl(&self) -> Decimal {
        self.pnl - self.fees
    }

    /// Seconds the position was held.
    pub fn holding_secs(&self) -> i64 {
        (self.exit_time - self.entry_time).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_validates_inputs() {
        assert!(Position::open("m1", "BTC", PositionSide::Up, Decimal::ZERO, Decimal::new(5, 1)).is_err());
        assert!(Position::open("m1", "BTC", PositionSide::Up, Decimal::new(100, 0), Decimal::ONE).is_err());
        let pos = Position::open("m1", "BTC", PositionSide::Up, Decimal::new(100, 0), Decimal::new(5, 1)).unwrap();
        assert_eq!(pos.status, PositionStatus::Open);
        assert_eq!(pos.shares(), Decimal::new(200, 0));
    }

    #[test]
    fn test_pnl_by_side() {
        let up = Position::open("m1", "BTC", PositionSide::Up, Decimal::new(100, 0), Decimal::new(5, 1)).unwrap();
        // 200 shares, +0.1 => +20
        assert_eq!(up.unrealized_pnl(Decimal::new(6, 1)), Decimal::new(20, 0));

        let down = Position::open("m1", "BTC", PositionSide::Down, Decimal::new(100, 0), Decimal::new(5, 1)).unwrap();
        assert_eq!(down.unrealized_pnl(Decimal::new(6, 1)), Decimal::new(-20, 0));
        assert_eq!(down.unrealized_pnl(Decimal::new(4, 1)), Decimal::new(20, 0));
    }

    #[test]
    fn test_apply_fill_weighted_average() {
        let mut pos = Position::open("m1", "BTC", PositionSide::Up, Decimal::new(50, 0), Decimal::new(5, 1)).unwrap();
        // 100 shares @ 0.5 plus 100 shares @ 0.6 = 110 over 200 shares
        pos.apply_fill(Decimal::new(60, 0), Decimal::new(6, 1));
        assert_eq!(pos.size, Decimal::new(110, 0));
        assert_eq!(pos.entry_price, Decimal::new(55, 2));

        pos.apply_fill(Decimal::ZERO, Decimal::new(6, 1));
        assert_eq!(pos.size, Decimal::new(110, 0));
    }

    #[test]
    fn test_closing_transitions() {
        let mut pos = Position::open("m1", "BTC", PositionSide::Down, Decimal::new(100, 0), Decimal::new(5, 1)).unwrap();
        assert!(pos.revert_closing().is_err());
        assert!(pos.mark_closing().is_ok());
        assert!(pos.mark_closing().is_err());
        assert!(pos.is_open());
        assert!(pos.revert_closing().is_ok());
        assert_eq!(pos.status, PositionStatus::Open);
    }

    #[test]
    fn test_order_sides() {
        assert_eq!(PositionSide::Up.entry_order_side(), OrderSide::Buy);
        assert_eq!(PositionSide::Down.entry_order_side(), OrderSide::Sell);
        assert_eq!(PositionSide::Down.exit_order_side(), OrderSide::Buy);
    }
}
