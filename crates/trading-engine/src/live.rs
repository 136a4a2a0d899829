//! Live execution gateway: place, poll, reconcile partial fills, cancel.
//!
//! Each order is polled on a fixed interval until it is terminal or an
//! absolute deadline passes. Every venue call is bounded by that deadline;
//! a poll that overruns it counts as a missed tick. Cancellation (operator
//! or shutdown) sets a flag and wakes the order's loop. A cancel always
//! marks the order Cancelled locally, whether or not the venue
//! acknowledged it.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use polymarket_core::api::OrderType;
use polymarket_core::config::{ExecutionConfig, ExecutionMode};
use polymarket_core::types::{
    ExecutionErrorCode, FillIncrement, Order, OrderSide, OrderStatus,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::cost_model::{CostEstimate, CostModel};
use crate::engine::{
    limit_price, order_shares, round_down, CloseRequest, ExecutionEngine, FillOutcome, FillReport,
    OpenRequest,
};
use crate::stats::{ExecutorStats, ExecutorStatsAggregator};
use crate::venue::{PlaceOrder, Venue, VenueOrderStatus};

/// Configuration for the live gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub poll_interval: Duration,
    /// Absolute deadline measured from placement.
    pub order_timeout: Duration,
    /// Bound on each of the final cancel and the status read after it.
    pub settle_timeout: Duration,
    pub spread_fraction: Decimal,
    pub partial_fill_threshold: Decimal,
    pub order_expiration: chrono::Duration,
    pub price_tick: Decimal,
    pub size_step: Decimal,
    /// Fee rate applied to filled notional.
    pub fee_rate: Decimal,
    /// Deadline for a fill-or-kill exit.
    pub aggressive_timeout: Duration,
    pub aggressive_buy_price: Decimal,
    pub aggressive_sell_price: Decimal,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            order_timeout: Duration::from_millis(5000),
            settle_timeout: Duration::from_millis(250),
            spread_fraction: Decimal::new(3, 1),
            partial_fill_threshold: Decimal::new(9, 1),
            order_expiration: chrono::Duration::seconds(3600),
            price_tick: Decimal::new(1, 3),
            size_step: Decimal::new(1, 2),
            fee_rate: Decimal::ZERO,
            aggressive_timeout: Duration::from_millis(2000),
            aggressive_buy_price: Decimal::new(99, 2),
            aggressive_sell_price: Decimal::new(1, 2),
        }
    }
}

impl From<&ExecutionConfig> for GatewayConfig {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            order_timeout: Duration::from_millis(config.order_timeout_ms),
            settle_timeout: Duration::from_millis(config.settle_timeout_ms),
            spread_fraction: config.spread_fraction,
            partial_fill_threshold: config.partial_fill_threshold,
            order_expiration: chrono::Duration::seconds(config.order_expiration_secs),
            price_tick: config.price_tick,
            size_step: config.size_step,
            fee_rate: config.fee_rate,
            aggressive_timeout: Duration::from_millis(config.aggressive_timeout_ms),
            aggressive_buy_price: config.aggressive_buy_price,
            aggressive_sell_price: config.aggressive_sell_price,
        }
    }
}

#[derive(Debug, Clone)]
struct InFlightOrder {
    market_id: String,
    side: OrderSide,
    requested_size: Decimal,
    /// Wakes the order's loop when a cancel is requested.
    wake: Arc<Notify>,
}

/// One order to drive to a terminal state.
struct OrderPlan<'a> {
    market_id: &'a str,
    token_id: &'a str,
    side: OrderSide,
    shares: Decimal,
    limit_price: Decimal,
    order_type: OrderType,
    timeout: Duration,
    /// Slippage is measured against this price instead of the limit.
    reference_price: Option<Decimal>,
    estimate: CostEstimate,
}

/// Order gateway over any [`Venue`].
pub struct LiveGateway<V: Venue> {
    venue: Arc<V>,
    config: GatewayConfig,
    mode: ExecutionMode,
    cost_model: CostModel,
    in_flight: DashMap<String, InFlightOrder>,
    cancel_requests: DashSet<String>,
    /// Externally delivered statuses, applied at the next tick.
    notifications: DashMap<String, VenueOrderStatus>,
    shutting_down: AtomicBool,
    stats: ExecutorStatsAggregator,
}

impl<V: Venue> LiveGateway<V> {
    pub fn new(venue: Arc<V>, config: GatewayConfig, mode: ExecutionMode) -> Self {
        let expected_latency = config.poll_interval.as_millis() as u64;
        Self {
            venue,
            config,
            mode,
            cost_model: CostModel::new(expected_latency),
            in_flight: DashMap::new(),
            cancel_requests: DashSet::new(),
            notifications: DashMap::new(),
            shutting_down: AtomicBool::new(false),
            stats: ExecutorStatsAggregator::new(),
        }
    }

    pub fn venue(&self) -> &Arc<V> {
        &self.venue
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Ids of orders not yet terminal.
    pub fn in_flight_orders(&self) -> Vec<String> {
        self.in_flight.iter().map(|e| e.key().clone()).collect()
    }

    /// Deliver a status pushed by the venue.
    ///
    /// Returns false when the order is unknown or already final, in which
    /// case nothing changes.
    pub fn on_status_notification(&self, order_id: &str, status: VenueOrderStatus) -> bool {
        if self.stats.is_finalized(order_id) {
            debug!(order_id = %order_id, status = ?status.status, "Notification for finalized order ignored");
            return false;
        }
        if !self.in_flight.contains_key(order_id) {
            warn!(order_id = %order_id, "Notification for unknown order ignored");
            return false;
        }
        self.notifications.insert(order_id.to_string(), status);
        true
    }

    fn apply(&self, order: &mut Order, status: VenueOrderStatus, increments: &mut Vec<FillIncrement>) {
        if let Some(increment) = order.apply_report(status.status, status.filled_size, status.avg_fill_price) {
            debug!(
                order_id = %order.id,
                size = %increment.size,
                price = %increment.price,
                cumulative = %order.filled_size,
                "Fill increment"
            );
            increments.push(increment);
        }
    }

    /// Best-effort venue cancel, then one last read to capture late fills.
    /// Each call gets its own short bound.
    async fn cancel_at_venue(&self, order: &mut Order, increments: &mut Vec<FillIncrement>) {
        let settle = self.config.settle_timeout;
        match timeout(settle, self.venue.cancel_order(&order.id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(order_id = %order.id, error = %e, "Venue cancel failed, cancelling locally"),
            Err(_) => warn!(order_id = %order.id, "Venue cancel timed out, cancelling locally"),
        }
        match timeout(settle, self.venue.order_status(&order.id)).await {
            Ok(Ok(status)) => self.apply(order, status, increments),
            Ok(Err(e)) => debug!(order_id = %order.id, error = %e, "Post-cancel status unavailable"),
            Err(_) => warn!(order_id = %order.id, "Post-cancel status read timed out"),
        }
        order.mark_cancelled();
    }

    fn resolve(&self, order: &Order) -> FillOutcome {
        match order.status {
            OrderStatus::Filled => FillOutcome::Filled,
            OrderStatus::Expired => FillOutcome::Expired,
            _ if order.filled_size > Decimal::ZERO
                && order.fill_ratio() >= self.config.partial_fill_threshold =>
            {
                FillOutcome::PartialAccepted
            }
            _ => FillOutcome::Cancelled,
        }
    }

    fn is_cancel_requested(&self, order_id: &str) -> bool {
        self.shutting_down.load(Ordering::SeqCst) || self.cancel_requests.contains(order_id)
    }

    /// Place one order and drive it to a terminal state. Never retries.
    async fn execute(&self, plan: OrderPlan<'_>) -> FillReport {
        let OrderPlan {
            market_id,
            token_id,
            side,
            shares,
            limit_price,
            order_type,
            timeout: order_timeout,
            reference_price,
            estimate,
        } = plan;

        if self.shutting_down.load(Ordering::SeqCst) {
            return FillReport::failed(
                market_id,
                side,
                shares,
                limit_price,
                ExecutionErrorCode::InvalidRequest,
                "gateway is shutting down",
            );
        }
        if shares <= Decimal::ZERO {
            return FillReport::failed(
                market_id,
                side,
                shares,
                limit_price,
                ExecutionErrorCode::InvalidRequest,
                "order size rounds to zero",
            );
        }

        let started = Instant::now();
        let deadline = started + order_timeout;
        let expiration = Utc::now() + self.config.order_expiration;
        let request = PlaceOrder {
            token_id: token_id.to_string(),
            side,
            price: limit_price,
            size: shares,
            expiration,
            order_type,
        };

        let placed = match timeout_at(deadline, self.venue.place_order(&request)).await {
            Ok(result) => result.map_err(|e| (e.code(), e.to_string())),
            Err(_) => Err((
                ExecutionErrorCode::VenueUnreachable,
                "order placement timed out".to_string(),
            )),
        };
        let order_id = match placed {
            Ok(id) => id,
            Err((code, message)) => {
                self.stats.record_failure();
                warn!(
                    market = %market_id,
                    side = ?side,
                    price = %limit_price,
                    size = %shares,
                    error = %message,
                    "Order placement failed"
                );
                let mut report = FillReport::failed(market_id, side, shares, limit_price, code, message);
                report.cost_estimate = estimate;
                report.latency_ms = started.elapsed().as_millis() as u64;
                return report;
            }
        };

        let wake = Arc::new(Notify::new());
        self.stats.record_placed(&order_id);
        self.in_flight.insert(
            order_id.clone(),
            InFlightOrder {
                market_id: market_id.to_string(),
                side,
                requested_size: shares,
                wake: wake.clone(),
            },
        );
        info!(
            order_id = %order_id,
            market = %market_id,
            side = ?side,
            price = %limit_price,
            size = %shares,
            order_type = ?order_type,
            "Order placed"
        );

        let mut order = Order::new(
            order_id.clone(),
            token_id.to_string(),
            side,
            limit_price,
            shares,
            expiration,
        );
        let mut increments = Vec::new();

        let outcome = loop {
            let tick = (Instant::now() + self.config.poll_interval).min(deadline);
            tokio::select! {
                _ = tokio::time::sleep_until(tick) => {}
                _ = wake.notified() => {}
            }

            if self.is_cancel_requested(&order_id) {
                warn!(order_id = %order_id, filled = %order.filled_size, "Cancelling order on request");
                self.cancel_at_venue(&mut order, &mut increments).await;
                break self.resolve(&order);
            }

            if let Some((_, status)) = self.notifications.remove(&order_id) {
                self.apply(&mut order, status, &mut increments);
            }
            if !order.is_terminal() {
                tokio::select! {
                    polled = timeout_at(deadline, self.venue.order_status(&order_id)) => match polled {
                        Ok(Ok(status)) => self.apply(&mut order, status, &mut increments),
                        Ok(Err(e)) => warn!(order_id = %order_id, error = %e, "Order status poll failed"),
                        Err(_) => warn!(order_id = %order_id, "Order status poll overran deadline"),
                    },
                    _ = wake.notified() => debug!(order_id = %order_id, "Status poll interrupted"),
                }
            }
            if order.is_terminal() {
                break self.resolve(&order);
            }

            if self.is_cancel_requested(&order_id) {
                warn!(order_id = %order_id, filled = %order.filled_size, "Cancelling order on request");
                self.cancel_at_venue(&mut order, &mut increments).await;
                break self.resolve(&order);
            }
            if Instant::now() >= deadline {
                warn!(
                    order_id = %order_id,
                    filled = %order.filled_size,
                    requested = %order.requested_size,
                    "Order timed out, cancelling remainder"
                );
                self.cancel_at_venue(&mut order, &mut increments).await;
                break self.resolve(&order);
            }
        };

        self.in_flight.remove(&order_id);
        self.cancel_requests.remove(&order_id);
        self.notifications.remove(&order_id);

        let latency_ms = started.elapsed().as_millis() as u64;
        let has_fill = order.filled_size > Decimal::ZERO;
        let slippage = if has_fill {
            order
                .slippage_against(reference_price.unwrap_or(limit_price))
                .unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
        let filled_notional: Decimal = increments.iter().map(|i| i.notional()).sum();
        let fees = filled_notional * self.config.fee_rate;

        self.stats.record_terminal(
            &order_id,
            outcome,
            has_fill.then_some(slippage),
            latency_ms,
        );

        info!(
            order_id = %order_id,
            market = %market_id,
            outcome = ?outcome,
            filled = %order.filled_size,
            requested = %order.requested_size,
            avg_price = ?order.avg_fill_price,
            slippage = %slippage,
            latency_ms,
            "Order complete"
        );

        FillReport {
            order_id: Some(order_id),
            market_id: market_id.to_string(),
            outcome,
            side,
            requested_size: order.requested_size,
            filled_size: order.filled_size,
            avg_fill_price: order.avg_fill_price,
            limit_price,
            slippage,
            latency_ms,
            fees,
            increments,
            cost_estimate: estimate,
            error_code: None,
            error_message: None,
            completed_at: Utc::now(),
        }
    }
}

#[async_trait]
impl<V: Venue + 'static> ExecutionEngine for LiveGateway<V> {
    fn mode(&self) -> ExecutionMode {
        self.mode
    }

    async fn attempt_open(&self, request: &OpenRequest) -> FillReport {
        let snapshot = &request.snapshot;
        let side = request.side.entry_order_side();
        let limit = limit_price(snapshot, side, self.config.spread_fraction, self.config.price_tick);
        let shares = order_shares(request.notional, limit, self.config.size_step);
        let estimate = self.cost_model.estimate_for(snapshot, shares);
        self.execute(OrderPlan {
            market_id: &snapshot.market_id,
            token_id: &snapshot.token_id,
            side,
            shares,
            limit_price: limit,
            order_type: OrderType::Gtd,
            timeout: self.config.order_timeout,
            reference_price: None,
            estimate,
        })
        .await
    }

    async fn attempt_close(&self, request: &CloseRequest) -> FillReport {
        let snapshot = &request.snapshot;
        let side = request.position.side.exit_order_side();
        let limit = limit_price(snapshot, side, self.config.spread_fraction, self.config.price_tick);
        let shares = round_down(request.position.shares(), self.config.size_step);
        let estimate = self.cost_model.estimate_for(snapshot, shares);
        self.execute(OrderPlan {
            market_id: &snapshot.market_id,
            token_id: &snapshot.token_id,
            side,
            shares,
            limit_price: limit,
            order_type: OrderType::Gtd,
            timeout: self.config.order_timeout,
            reference_price: None,
            estimate,
        })
        .await
    }

    /// Fill-or-kill at the marketable limit; slippage is measured from mid.
    async fn attempt_exit_now(&self, request: &CloseRequest) -> FillReport {
        let snapshot = &request.snapshot;
        let side = request.position.side.exit_order_side();
        let limit = match side {
            OrderSide::Buy => self.config.aggressive_buy_price,
            OrderSide::Sell => self.config.aggressive_sell_price,
        };
        let shares = round_down(request.position.shares(), self.config.size_step);
        let estimate = self.cost_model.estimate_for(snapshot, shares);
        info!(
            market = %snapshot.market_id,
            side = ?side,
            shares = %shares,
            limit = %limit,
            "Aggressive exit"
        );
        self.execute(OrderPlan {
            market_id: &snapshot.market_id,
            token_id: &snapshot.token_id,
            side,
            shares,
            limit_price: limit,
            order_type: OrderType::Fok,
            timeout: self.config.aggressive_timeout,
            reference_price: Some(snapshot.mid_price),
            estimate,
        })
        .await
    }

    fn stats(&self) -> ExecutorStats {
        self.stats.snapshot()
    }

    async fn cancel(&self, order_id: &str) -> bool {
        match self.in_flight.get(order_id) {
            Some(entry) => {
                info!(
                    order_id = %order_id,
                    market = %entry.market_id,
                    side = ?entry.side,
                    requested = %entry.requested_size,
                    "Cancel requested"
                );
                self.cancel_requests.insert(order_id.to_string());
                entry.wake.notify_one();
                true
            }
            None => {
                warn!(order_id = %order_id, "Order not found for cancellation");
                false
            }
        }
    }

    async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        info!(in_flight = self.in_flight.len(), "Gateway shutting down");
        for entry in self.in_flight.iter() {
            entry.wake.notify_one();
        }

        let limit = Instant::now() + self.config.order_timeout + self.config.poll_interval;
        while !self.in_flight.is_empty() && Instant::now() < limit {
            tokio::time::sleep(self.config.poll_interval).await;
        }
        if !self.in_flight.is_empty() {
            warn!(remaining = self.in_flight.len(), "Gateway shut down with orders still resolving");
        }
    }
}
