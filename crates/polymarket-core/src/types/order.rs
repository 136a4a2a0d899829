//! Order types for live execution.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// Wire representation used by the CLOB.
    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Current status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Resting on the book with no fill.
    Pending,
    /// Resting on the book with some fill.
    PartiallyFilled,
    /// Fully filled.
    Filled,
    /// Cancelled by us (operator, timeout or shutdown).
    Cancelled,
    /// Exchange-side expiry reached with zero fill.
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Expired
        )
    }
}

/// Fill observed between two consecutive status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillIncrement {
    /// Shares filled in this increment.
    pub size: Decimal,
    /// Average price of this increment.
    pub price: Decimal,
}

impl FillIncrement {
    pub fn notional(&self) -> Decimal {
        self.size * self.price
    }
}

/// Why an order attempt failed before or during placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorCode {
    VenueUnreachable,
    OrderRejected,
    AuthFailure,
    InvalidRequest,
}

/// A live order tracked until it reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Venue-assigned order id.
    pub id: String,
    pub token_id: String,
    pub side: OrderSide,
    pub limit_price: Decimal,
    /// Requested size in shares.
    pub requested_size: Decimal,
    /// Cumulative filled shares.
    pub filled_size: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    /// Exchange-side expiration.
    pub expiration: DateTime<Utc>,
    pub fill_time: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(
        id: String,
        token_id: String,
        side: OrderSide,
        limit_price: Decimal,
        requested_size: Decimal,
        expiration: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            token_id,
            side,
            limit_price,
            requested_size,
            filled_size: Decimal::ZERO,
            avg_fill_price: None,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            expiration,
            fill_time: None,
        }
    }

    pub fn remaining_size(&self) -> Decimal {
        self.requested_size - self.filled_size
    }

    /// Filled fraction of the requested size.
    pub fn fill_ratio(&self) -> Decimal {
        if self.requested_size.is_zero() {
            Decimal::ZERO
        } else {
            self.filled_size / self.requested_size
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a venue status report and return the newly filled increment.
    ///
    /// Reports against a terminal order are ignored. Filled size never
    /// decreases and never exceeds the requested size.
    pub fn apply_report(
        &mut self,
        status: OrderStatus,
        filled_size: Decimal,
        avg_fill_price: Option<Decimal>,
    ) -> Option<FillIncrement> {
        if self.is_terminal() {
            return None;
        }

        let mut filled = filled_size.max(self.filled_size).min(self.requested_size);
        if status == OrderStatus::Filled {
            filled = self.requested_size;
        }

        let previous = self.filled_size;
        let previous_avg = self.avg_fill_price.unwrap_or(self.limit_price);
        let new_avg = avg_fill_price.unwrap_or(previous_avg);
        let delta = filled - previous;

        let increment = if delta > Decimal::ZERO {
            let increment_price = if previous.is_zero() {
                new_avg
            } else {
                (new_avg * filled - previous_avg * previous) / delta
            };
            self.filled_size = filled;
            self.avg_fill_price = Some(new_avg);
            Some(FillIncrement {
                size: delta,
                price: increment_price,
            })
        } else {
            None
        };

        let complete = self.requested_size > Decimal::ZERO && self.filled_size >= self.requested_size;
        self.status = match status {
            // A cumulative fill of the whole size is a fill, whatever the label.
            _ if status == OrderStatus::Filled || complete => {
                self.fill_time = Some(Utc::now());
                OrderStatus::Filled
            }
            OrderStatus::Pending | OrderStatus::PartiallyFilled if self.filled_size > Decimal::ZERO => {
                OrderStatus::PartiallyFilled
            }
            OrderStatus::Pending | OrderStatus::PartiallyFilled => OrderStatus::Pending,
            // An expiry after some fill is a cancellation of the remainder.
            OrderStatus::Expired if self.filled_size > Decimal::ZERO => OrderStatus::Cancelled,
            other => other,
        };

        increment
    }

    /// Mark the order cancelled locally. Returns false if already terminal.
    pub fn mark_cancelled(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = OrderStatus::Cancelled;
        true
    }

    /// Fill price minus limit, normalised so a worse fill is positive.
    pub fn slippage(&self) -> Option<Decimal> {
        self.slippage_against(self.limit_price)
    }

    /// Fill price minus `reference`, normalised so a worse fill is positive.
    pub fn slippage_against(&self, reference: Decimal) -> Option<Decimal> {
        self.avg_fill_price.map(|avg| match self.side {
            OrderSide::Buy => avg - reference,
            OrderSide::Sell => reference - avg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_order(side: OrderSide) -> Order {
        Order::new(
            "ord-1".to_string(),
            "tok".to_string(),
            side,
            Decimal::new(50, 2),
            Decimal::new(100, 0),
            Utc::now() + Duration::hours(1),
        )
    }

    #[test]
    fn test_partial_then_full_fill_increments() {
        let mut order = test_order(OrderSide::Buy);

        let first = order
            .apply_report(OrderStatus::PartiallyFilled, Decimal::new(40, 0), Some(Decimal::new(50, 2)))
            .unwrap();
        assert_eq!(first.size, Decimal::new(40, 0));
        assert_eq!(first.price, Decimal::new(50, 2));
        assert_eq!(order.status, OrderStatus::PartiallyFilled);

        // Cumulative avg 0.506 over 100 shares => last 60 at 0.51
        let second = order
            .apply_report(OrderStatus::Filled, Decimal::new(100, 0), Some(Decimal::new(506, 3)))
            .unwrap();
        assert_eq!(second.size, Decimal::new(60, 0));
        assert_eq!(second.price, Decimal::new(51, 2));
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_size, order.requested_size);
    }

    #[test]
    fn test_reports_after_terminal_are_ignored() {
        let mut order = test_order(OrderSide::Buy);
        order.apply_report(OrderStatus::Filled, Decimal::new(100, 0), Some(Decimal::new(50, 2)));
        assert!(order
            .apply_report(OrderStatus::Filled, Decimal::new(100, 0), Some(Decimal::new(60, 2)))
            .is_none());
        assert_eq!(order.avg_fill_price, Some(Decimal::new(50, 2)));
        assert!(!order.mark_cancelled());
    }

    #[test]
    fn test_filled_size_is_monotone_and_capped() {
        let mut order = test_order(OrderSide::Sell);
        order.apply_report(OrderStatus::PartiallyFilled, Decimal::new(30, 0), None);
        assert!(order
            .apply_report(OrderStatus::PartiallyFilled, Decimal::new(10, 0), None)
            .is_none());
        assert_eq!(order.filled_size, Decimal::new(30, 0));

        order.apply_report(OrderStatus::PartiallyFilled, Decimal::new(500, 0), None);
        assert_eq!(order.filled_size, Decimal::new(100, 0));
    }

    #[test]
    fn test_complete_partial_report_is_a_fill() {
        let mut order = test_order(OrderSide::Buy);
        let increment = order
            .apply_report(OrderStatus::PartiallyFilled, Decimal::new(100, 0), Some(Decimal::new(50, 2)))
            .unwrap();
        assert_eq!(increment.size, Decimal::new(100, 0));
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.is_terminal());
        assert!(order.fill_time.is_some());

        let mut pending = test_order(OrderSide::Sell);
        pending.apply_report(OrderStatus::Pending, Decimal::new(100, 0), None);
        assert_eq!(pending.status, OrderStatus::Filled);
    }

    #[test]
    fn test_expiry_with_zero_fill() {
        let mut order = test_order(OrderSide::Buy);
        order.apply_report(OrderStatus::Expired, Decimal::ZERO, None);
        assert_eq!(order.status, OrderStatus::Expired);

        let mut partial = test_order(OrderSide::Buy);
        partial.apply_report(OrderStatus::Expired, Decimal::new(5, 0), None);
        assert_eq!(partial.status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_slippage_is_side_normalised() {
        let mut buy = test_order(OrderSide::Buy);
        buy.apply_report(OrderStatus::Filled, Decimal::new(100, 0), Some(Decimal::new(51, 2)));
        assert_eq!(buy.slippage(), Some(Decimal::new(1, 2)));

        let mut sell = test_order(OrderSide::Sell);
        sell.apply_report(OrderStatus::Filled, Decimal::new(100, 0), Some(Decimal::new(49, 2)));
        assert_eq!(sell.slippage(), Some(Decimal::new(1, 2)));
        assert_eq!(sell.slippage_against(Decimal::new(48, 2)), Some(Decimal::new(-1, 2)));
    }
}
