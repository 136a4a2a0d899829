//! The execution capability shared by paper and live engines.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use polymarket_core::config::ExecutionMode;
use polymarket_core::types::{
    ExecutionErrorCode, FillIncrement, MarketSnapshot, OrderSide, Position, PositionSide,
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::cost_model::CostEstimate;
use crate::stats::ExecutorStats;

/// Request to enter a position.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub snapshot: MarketSnapshot,
    pub side: PositionSide,
    /// Notional in USD.
    pub notional: Decimal,
}

/// Request to exit an open position.
#[derive(Debug, Clone)]
pub struct CloseRequest {
    pub snapshot: MarketSnapshot,
    pub position: Position,
}

/// How an execution attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillOutcome {
    /// Fully filled.
    Filled,
    /// Filled at or above the acceptance threshold; remainder cancelled.
    PartialAccepted,
    /// Cancelled by timeout, operator or shutdown; any partial fill is kept.
    Cancelled,
    /// Expired on the venue with no fill.
    Expired,
    /// Never reached the book.
    Failed,
}

/// Result of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillReport {
    pub order_id: Option<String>,
    pub market_id: String,
    pub outcome: FillOutcome,
    pub side: OrderSide,
    /// Shares requested.
    pub requested_size: Decimal,
    /// Shares filled.
    pub filled_size: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub limit_price: Decimal,
    /// Side-normalised; positive is a cost.
    pub slippage: Decimal,
    pub latency_ms: u64,
    pub fees: Decimal,
    /// Fills observed poll by poll.
    pub increments: Vec<FillIncrement>,
    /// Counterfactual cost, for calibration only.
    pub cost_estimate: CostEstimate,
    pub error_code: Option<ExecutionErrorCode>,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl FillReport {
    /// A report for an attempt that never reached the book.
    pub fn failed(
        market_id: &str,
        side: OrderSide,
        requested_size: Decimal,
        limit_price: Decimal,
        code: ExecutionErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            order_id: None,
            market_id: market_id.to_string(),
            outcome: FillOutcome::Failed,
            side,
            requested_size,
            filled_size: Decimal::ZERO,
            avg_fill_price: None,
            limit_price,
            slippage: Decimal::ZERO,
            latency_ms: 0,
            fees: Decimal::ZERO,
            increments: Vec::new(),
            cost_estimate: CostEstimate::default(),
            error_code: Some(code),
            error_message: Some(message.into()),
            completed_at: Utc::now(),
        }
    }

    pub fn has_fill(&self) -> bool {
        self.filled_size > Decimal::ZERO
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, FillOutcome::Filled | FillOutcome::PartialAccepted)
    }

    /// USD value of the filled shares.
    pub fn filled_notional(&self) -> Decimal {
        self.increments.iter().map(|i| i.notional()).sum()
    }
}

/// An engine that turns admitted decisions into fills.
///
/// The ledger and risk manager only ever see this trait.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    fn mode(&self) -> ExecutionMode;

    async fn attempt_open(&self, request: &OpenRequest) -> FillReport;

    async fn attempt_close(&self, request: &CloseRequest) -> FillReport;

    /// Exit now, crossing the book with a fill-or-kill order.
    ///
    /// Engines without a book to cross exit the same way as
    /// [`attempt_close`](Self::attempt_close).
    async fn attempt_exit_now(&self, request: &CloseRequest) -> FillReport {
        self.attempt_close(request).await
    }

    fn stats(&self) -> ExecutorStats;

    /// Request cancellation of an in-flight order.
    async fn cancel(&self, order_id: &str) -> bool;

    /// Cancel everything in flight and refuse new orders.
    async fn shutdown(&self);
}

/// Limit price biased `fraction` of the spread into the book.
///
/// Rounded to `tick` and clamped into `[tick, 1 - tick]`.
pub fn limit_price(snapshot: &MarketSnapshot, side: OrderSide, fraction: Decimal, tick: Decimal) -> Decimal {
    let spread = snapshot.spread();
    let raw = match side {
        OrderSide::Buy => snapshot.best_bid + fraction * spread,
        OrderSide::Sell => snapshot.best_ask - fraction * spread,
    };
    let rounded = if tick > Decimal::ZERO {
        (raw / tick).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven) * tick
    } else {
        raw
    };
    rounded.max(tick).min(Decimal::ONE - tick)
}

/// Shares purchasable for `notional` at `price`, rounded down to `step`.
pub fn order_shares(notional: Decimal, price: Decimal, step: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    round_down(notional / price, step)
}

/// Round down to a multiple of `step`.
pub fn round_down(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    (value / step).floor() * step
}
