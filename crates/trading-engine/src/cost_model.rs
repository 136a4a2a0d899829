//! Execution cost estimates used for reporting and calibration.
//!
//! Estimates are never applied to fills; they describe what a trade would
//! have cost so paper results can be compared against live ones.

use polymarket_core::types::MarketSnapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const MS_PER_MINUTE: i64 = 60_000;

/// Breakdown of expected execution cost, in price units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CostEstimate {
    pub spread_cost: Decimal,
    pub market_impact: Decimal,
    pub latency_cost: Decimal,
    pub expected_total_cost: Decimal,
}

/// Cost model parameterised by expected round-trip latency.
#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    pub latency_ms: u64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self { latency_ms: 250 }
    }
}

impl CostModel {
    pub fn new(latency_ms: u64) -> Self {
        Self { latency_ms }
    }

    /// Half the bid/ask spread.
    pub fn spread_cost(spread: Decimal) -> Decimal {
        spread / Decimal::TWO
    }

    /// `(order_size / book_depth) * realized_volatility`.
    ///
    /// An empty book is treated as an impact ratio of 1.
    pub fn market_impact(order_size: Decimal, book_depth: Decimal, realized_volatility: Decimal) -> Decimal {
        let ratio = if book_depth <= Decimal::ZERO {
            Decimal::ONE
        } else {
            order_size / book_depth
        };
        ratio * realized_volatility
    }

    /// `|return_1m| * latency_ms / 60000`.
    pub fn latency_cost(return_1m: Decimal, latency_ms: u64) -> Decimal {
        return_1m.abs() * Decimal::from(latency_ms) / Decimal::from(MS_PER_MINUTE)
    }

    pub fn estimate(
        &self,
        spread: Decimal,
        order_size: Decimal,
        book_depth: Decimal,
        realized_volatility: Decimal,
        return_1m: Decimal,
    ) -> CostEstimate {
        let spread_cost = Self::spread_cost(spread);
        let market_impact = Self::market_impact(order_size, book_depth, realized_volatility);
        let latency_cost = Self::latency_cost(return_1m, self.latency_ms);
        CostEstimate {
            spread_cost,
            market_impact,
            latency_cost,
            expected_total_cost: spread_cost + market_impact + latency_cost,
        }
    }

    /// Estimate for an order of `order_size` against a snapshot.
    pub fn estimate_for(&self, snapshot: &MarketSnapshot, order_size: Decimal) -> CostEstimate {
        self.estimate(
            snapshot.spread(),
            order_size,
            snapshot.book_depth(),
            snapshot.realized_volatility,
            snapshot.return_1m,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_components() {
        let model = CostModel::new(600);
        let estimate = model.estimate(
            Decimal::new(4, 2),    // spread 0.04
            Decimal::new(100, 0),  // size
            Decimal::new(1000, 0), // depth
            Decimal::new(2, 2),    // vol 0.02
            Decimal::new(-5, 3),   // return -0.005
        );
        assert_eq!(estimate.spread_cost, Decimal::new(2, 2));
        assert_eq!(estimate.market_impact, Decimal::new(2, 3));
        // 0.005 * 600 / 60000
        assert_eq!(estimate.latency_cost, Decimal::new(5, 5));
        assert_eq!(
            estimate.expected_total_cost,
            estimate.spread_cost + estimate.market_impact + estimate.latency_cost
        );
    }

    #[test]
    fn test_zero_depth_uses_full_volatility() {
        assert_eq!(
            CostModel::market_impact(Decimal::new(100, 0), Decimal::ZERO, Decimal::new(3, 2)),
            Decimal::new(3, 2)
        );
    }

    #[test]
    fn test_estimate_for_snapshot() {
        let snap = MarketSnapshot::new("m1", "BTC", "tok", Decimal::new(48, 2), Decimal::new(52, 2))
            .with_depth(Decimal::new(100, 0), Decimal::new(500, 0))
            .with_volatility(Decimal::new(1, 2), Decimal::ZERO);
        let estimate = CostModel::default().estimate_for(&snap, Decimal::new(50, 0));
        assert_eq!(estimate.spread_cost, Decimal::new(2, 2));
        assert_eq!(estimate.market_impact, Decimal::new(1, 3));
        assert_eq!(estimate.latency_cost, Decimal::ZERO);
    }
}
