//! Executor statistics, updated exactly once per terminal order.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tracing::debug;

use crate::engine::FillOutcome;

/// Operator-facing execution counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub total_orders_placed: u64,
    pub total_fills: u64,
    pub total_cancellations: u64,
    pub total_expired: u64,
    pub total_failures: u64,
    /// `total_fills / total_orders_placed`.
    pub fill_rate: Decimal,
    /// Running mean of side-normalised slippage over fills.
    pub avg_slippage: Decimal,
    /// Running mean of placement-to-terminal latency.
    pub avg_latency_ms: Decimal,
    /// Orders currently Pending or PartiallyFilled.
    pub active_orders: u64,
}

/// Finalized ids remembered for duplicate suppression; oldest forgotten first.
pub const FINALIZED_CAPACITY: usize = 10_000;

#[derive(Default)]
struct Inner {
    stats: ExecutorStats,
    latency_samples: u64,
    active: HashSet<String>,
    finalized: HashSet<String>,
    finalized_order: VecDeque<String>,
}

impl Inner {
    fn remember_final(&mut self, order_id: &str) -> bool {
        if !self.finalized.insert(order_id.to_string()) {
            return false;
        }
        self.finalized_order.push_back(order_id.to_string());
        while self.finalized_order.len() > FINALIZED_CAPACITY {
            if let Some(oldest) = self.finalized_order.pop_front() {
                self.finalized.remove(&oldest);
            }
        }
        true
    }
}

/// Aggregates execution outcomes, idempotent by order id.
#[derive(Default)]
pub struct ExecutorStatsAggregator {
    inner: Mutex<Inner>,
}

impl ExecutorStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record an accepted placement.
    pub fn record_placed(&self, order_id: &str) {
        let mut inner = self.lock();
        if inner.finalized.contains(order_id) || !inner.active.insert(order_id.to_string()) {
            return;
        }
        inner.stats.total_orders_placed += 1;
        inner.stats.active_orders = inner.active.len() as u64;
    }

    /// Record a placement that never reached the venue's book.
    pub fn record_failure(&self) {
        self.lock().stats.total_failures += 1;
    }

    /// Record a terminal outcome. Returns false if `order_id` was already final.
    pub fn record_terminal(
        &self,
        order_id: &str,
        outcome: FillOutcome,
        slippage: Option<Decimal>,
        latency_ms: u64,
    ) -> bool {
        let mut inner = self.lock();
        if !inner.remember_final(order_id) {
            debug!(order_id = %order_id, "Duplicate terminal outcome ignored");
            return false;
        }
        inner.active.remove(order_id);

        let counts_fill = matches!(outcome, FillOutcome::Filled | FillOutcome::PartialAccepted);
        match outcome {
            FillOutcome::Filled => inner.stats.total_fills += 1,
            FillOutcome::PartialAccepted => {
                inner.stats.total_fills += 1;
                inner.stats.total_cancellations += 1;
            }
            FillOutcome::Cancelled => inner.stats.total_cancellations += 1,
            FillOutcome::Expired => inner.stats.total_expired += 1,
            FillOutcome::Failed => inner.stats.total_failures += 1,
        }

        if counts_fill {
            if let Some(slippage) = slippage {
                let n = Decimal::from(inner.stats.total_fills);
                let prev = inner.stats.avg_slippage;
                inner.stats.avg_slippage = prev + (slippage - prev) / n;
            }
        }

        inner.latency_samples += 1;
        let n = Decimal::from(inner.latency_samples);
        let prev = inner.stats.avg_latency_ms;
        inner.stats.avg_latency_ms = prev + (Decimal::from(latency_ms) - prev) / n;

        inner.stats.active_orders = inner.active.len() as u64;
        inner.stats.fill_rate = if inner.stats.total_orders_placed == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(inner.stats.total_fills) / Decimal::from(inner.stats.total_orders_placed)
        };
        true
    }

    pub fn is_finalized(&self, order_id: &str) -> bool {
        self.lock().finalized.contains(order_id)
    }

    pub fn snapshot(&self) -> ExecutorStats {
        self.lock().stats.clone()
    }
}
