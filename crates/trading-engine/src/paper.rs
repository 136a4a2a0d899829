//! Paper execution: instant fills at mid with zero cost.

use async_trait::async_trait;
use chrono::Utc;
use polymarket_core::config::ExecutionMode;
use polymarket_core::types::{FillIncrement, MarketSnapshot, OrderSide};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::cost_model::{CostEstimate, CostModel};
use crate::engine::{
    order_shares, CloseRequest, ExecutionEngine, FillOutcome, FillReport, OpenRequest,
};
use crate::stats::{ExecutorStats, ExecutorStatsAggregator};

/// Simulated engine. Fills never carry the estimated costs.
pub struct PaperEngine {
    cost_model: CostModel,
    /// Entry shares are rounded down to this lot size, as live orders are.
    size_step: Decimal,
    stats: ExecutorStatsAggregator,
}

impl Default for PaperEngine {
    fn default() -> Self {
        Self::new(CostModel::default())
    }
}

impl PaperEngine {
    pub fn new(cost_model: CostModel) -> Self {
        Self {
            cost_model,
            size_step: Decimal::new(1, 2),
            stats: ExecutorStatsAggregator::new(),
        }
    }

    pub fn with_size_step(mut self, size_step: Decimal) -> Self {
        self.size_step = size_step;
        self
    }

    fn fill_at_mid(
        &self,
        snapshot: &MarketSnapshot,
        side: OrderSide,
        shares: Decimal,
        estimate: CostEstimate,
    ) -> FillReport {
        let order_id = format!("paper-{}", Uuid::new_v4());
        let price = snapshot.mid_price;

        self.stats.record_placed(&order_id);
        self.stats
            .record_terminal(&order_id, FillOutcome::Filled, Some(Decimal::ZERO), 0);

        info!(
            market = %snapshot.market_id,
            side = ?side,
            shares = %shares,
            price = %price,
            expected_cost = %estimate.expected_total_cost,
            "[PAPER] Simulated fill at mid"
        );

        FillReport {
            order_id: Some(order_id),
            market_id: snapshot.market_id.clone(),
            outcome: FillOutcome::Filled,
            side,
            requested_size: shares,
            filled_size: shares,
            avg_fill_price: Some(price),
            limit_price: price,
            slippage: Decimal::ZERO,
            latency_ms: 0,
            fees: Decimal::ZERO,
            increments: vec![FillIncrement { size: shares, price }],
            cost_estimate: estimate,
            error_code: None,
            error_message: None,
            completed_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ExecutionEngine for PaperEngine {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Paper
    }

    async fn attempt_open(&self, request: &OpenRequest) -> FillReport {
        let shares = order_shares(request.notional, request.snapshot.mid_price, self.size_step);
        let estimate = self.cost_model.estimate_for(&request.snapshot, shares);
        self.fill_at_mid(
            &request.snapshot,
            request.side.entry_order_side(),
            shares,
            estimate,
        )
    }

    async fn attempt_close(&self, request: &CloseRequest) -> FillReport {
        let shares = request.position.shares();
        let estimate = self.cost_model.estimate_for(&request.snapshot, shares);
        self.fill_at_mid(
            &request.snapshot,
            request.position.side.exit_order_side(),
            shares,
            estimate,
        )
    }

    fn stats(&self) -> ExecutorStats {
        self.stats.snapshot()
    }

    async fn cancel(&self, _order_id: &str) -> bool {
        false
    }

    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymarket_core::types::{Position, PositionSide};

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot::new("m1", "BTC", "tok", Decimal::new(48, 2), Decimal::new(52, 2))
            .with_depth(Decimal::new(500, 0), Decimal::new(2000, 0))
            .with_volatility(Decimal::new(2, 2), Decimal::new(1, 3))
    }

    #[tokio::test]
    async fn test_open_fills_at_mid_without_costs() {
        let engine = PaperEngine::default();
        let report = engine
            .attempt_open(&OpenRequest {
                snapshot: snapshot(),
                side: PositionSide::Up,
                notional: Decimal::new(100, 0),
            })
            .await;

        assert_eq!(report.outcome, FillOutcome::Filled);
        assert_eq!(report.side, OrderSide::Buy);
        assert_eq!(report.avg_fill_price, Some(Decimal::new(50, 2)));
        assert_eq!(report.filled_size, Decimal::new(200, 0));
        assert_eq!(report.filled_notional(), Decimal::new(100, 0));
        assert_eq!(report.fees, Decimal::ZERO);
        assert_eq!(report.slippage, Decimal::ZERO);
        assert!(report.cost_estimate.expected_total_cost > Decimal::ZERO);
        assert_eq!(engine.stats().total_fills, 1);
    }

    #[tokio::test]
    async fn test_open_shares_rounded_to_lot() {
        // mid 0.49: 100 / 0.49 = 204.0816...
        let snapshot = MarketSnapshot::new("m1", "BTC", "tok", Decimal::new(48, 2), Decimal::new(50, 2));
        let request = OpenRequest {
            snapshot,
            side: PositionSide::Up,
            notional: Decimal::new(100, 0),
        };

        let report = PaperEngine::default().attempt_open(&request).await;
        assert_eq!(report.filled_size, Decimal::new(20408, 2));
        assert!(report.filled_notional() <= Decimal::new(100, 0));

        let coarse = PaperEngine::default().with_size_step(Decimal::ONE);
        assert_eq!(coarse.attempt_open(&request).await.filled_size, Decimal::new(204, 0));
    }

    #[tokio::test]
    async fn test_exit_now_fills_at_mid() {
        let engine = PaperEngine::default();
        let position =
            Position::open("m1", "BTC", PositionSide::Up, Decimal::new(50, 0), Decimal::new(5, 1)).unwrap();
        let report = engine
            .attempt_exit_now(&CloseRequest {
                snapshot: snapshot(),
                position,
            })
            .await;
        assert_eq!(report.outcome, FillOutcome::Filled);
        assert_eq!(report.side, OrderSide::Sell);
        assert_eq!(report.avg_fill_price, Some(Decimal::new(50, 2)));
    }

    #[tokio::test]
    async fn test_close_reverses_side() {
        let engine = PaperEngine::default();
        let position =
            Position::open("m1", "BTC", PositionSide::Down, Decimal::new(50, 0), Decimal::new(5, 1)).unwrap();
        let report = engine
            .attempt_close(&CloseRequest {
                snapshot: snapshot(),
                position,
            })
            .await;
        assert_eq!(report.side, OrderSide::Buy);
        assert_eq!(report.filled_size, Decimal::new(100, 0));
        assert!(!engine.cancel("anything").await);
    }
}
