//! Pre-trade admission and post-trade risk accounting.
//!
//! All global counters live behind a single mutex so admission checks and
//! post-trade updates from concurrent market workers are serialized.
//!
//! An admitted open holds a reservation for its notional until the fill is
//! booked in the ledger, so two markets admitted back to back both see each
//! other's exposure.

use chrono::{DateTime, Duration, Utc};
use polymarket_core::config::{DailyResetMode, RiskConfig};
use polymarket_core::types::TradeRecord;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use trading_engine::PositionLedger;
use uuid::Uuid;

use crate::circuit_breaker::{CircuitBreaker, TripReason};
use crate::limits::RiskLimits;
use crate::rate_window::OrderRateWindow;

/// Violations kept for operators.
const MAX_VIOLATION_LOG: usize = 500;

/// Applied trade ids remembered for duplicate suppression.
pub const PROCESSED_TRADES_CAPACITY: usize = 10_000;

/// Which admission check denied a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    CircuitBreaker,
    DailyLoss,
    EmergencyStop,
    PositionSize,
    TotalExposure,
    MarketExposure,
    OrderRateMinute,
    OrderRateHour,
    Drawdown,
}

/// A denied admission with its reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskViolation {
    pub timestamp: DateTime<Utc>,
    pub kind: ViolationKind,
    pub market_id: String,
    pub details: String,
}

impl std::fmt::Display for RiskViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.details)
    }
}

/// Notional reserved for an admitted open.
///
/// Hand it back with [`RiskManager::release`] once the fill is booked or
/// the order ended unfilled.
#[derive(Debug)]
#[must_use = "an admission holds exposure until released"]
pub struct Admission {
    id: Uuid,
    market_id: String,
    size: Decimal,
}

impl Admission {
    pub fn market_id(&self) -> &str {
        &self.market_id
    }

    pub fn size(&self) -> Decimal {
        self.size
    }
}

/// Snapshot of process-wide risk state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub session_pnl: Decimal,
    pub daily_pnl: Decimal,
    pub current_equity: Decimal,
    /// High-water mark; never decreases.
    pub peak_equity: Decimal,
    /// `(current - peak) / peak`; never positive.
    pub drawdown_pct: Decimal,
    pub open_positions: usize,
    pub total_exposure: Decimal,
    /// Notional admitted but not yet booked or released.
    pub reserved_exposure: Decimal,
    pub consecutive_losses: u32,
    pub total_trades: u64,
    pub violations: u64,
    pub orders_last_minute: u32,
    pub orders_last_hour: u32,
    pub circuit_breaker_active: bool,
    pub circuit_breaker_until: Option<DateTime<Utc>>,
    pub trip_reason: Option<TripReason>,
    pub daily_window_start: DateTime<Utc>,
}

struct Inner {
    limits: RiskLimits,
    breaker: CircuitBreaker,
    rate: OrderRateWindow,
    daily_reset: DailyResetMode,
    daily_window_start: DateTime<Utc>,
    session_pnl: Decimal,
    daily_pnl: Decimal,
    current_equity: Decimal,
    peak_equity: Decimal,
    consecutive_losses: u32,
    total_trades: u64,
    violation_count: u64,
    violations: VecDeque<RiskViolation>,
    processed_trades: HashSet<Uuid>,
    processed_order: VecDeque<Uuid>,
    reservations: HashMap<Uuid, (String, Decimal)>,
}

impl Inner {
    fn drawdown_pct(&self) -> Decimal {
        if self.peak_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.current_equity - self.peak_equity) / self.peak_equity).min(Decimal::ZERO)
    }

    fn maybe_reset_daily(&mut self, now: DateTime<Utc>) {
        let due = match self.daily_reset {
            DailyResetMode::UtcDay => now.date_naive() != self.daily_window_start.date_naive(),
            DailyResetMode::Rolling24h => now - self.daily_window_start >= Duration::hours(24),
        };
        if due {
            info!(
                previous_daily_pnl = %self.daily_pnl,
                mode = ?self.daily_reset,
                "Daily P&L reset"
            );
            self.daily_pnl = Decimal::ZERO;
            self.daily_window_start = now;
        }
    }

    fn reserved_total(&self) -> Decimal {
        self.reservations.values().map(|(_, size)| *size).sum()
    }

    fn reserved_for(&self, market_id: &str) -> Decimal {
        self.reservations
            .values()
            .filter(|(market, _)| market == market_id)
            .map(|(_, size)| *size)
            .sum()
    }

    /// Record a trade id; false if it was already applied.
    fn mark_processed(&mut self, trade_id: Uuid) -> bool {
        if !self.processed_trades.insert(trade_id) {
            return false;
        }
        self.processed_order.push_back(trade_id);
        while self.processed_order.len() > PROCESSED_TRADES_CAPACITY {
            if let Some(oldest) = self.processed_order.pop_front() {
                self.processed_trades.remove(&oldest);
            }
        }
        true
    }

    /// Run every admission check in order; the first failure denies.
    fn check(
        &mut self,
        ledger: &PositionLedger,
        market_id: &str,
        proposed_size: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), RiskViolation> {
        self.maybe_reset_daily(now);

        if self.breaker.is_active(now) {
            let until = self.breaker.state().resume_at;
            let reason = self.breaker.state().trip_reason;
            return Err(self.deny(
                ViolationKind::CircuitBreaker,
                market_id,
                format!("circuit breaker active ({:?}) until {:?}", reason, until),
                now,
            ));
        }

        let limits = self.limits.clone();

        if self.daily_pnl <= -limits.max_daily_loss {
            let details = format!("daily P&L {} at or below -{}", self.daily_pnl, limits.max_daily_loss);
            return Err(self.deny(ViolationKind::DailyLoss, market_id, details, now));
        }

        if self.session_pnl <= -limits.emergency_stop_loss {
            let details = format!(
                "session P&L {} at or below emergency stop -{}",
                self.session_pnl, limits.emergency_stop_loss
            );
            return Err(self.deny(ViolationKind::EmergencyStop, market_id, details, now));
        }

        if proposed_size > limits.max_position_size {
            let details = format!("size {} exceeds max {}", proposed_size, limits.max_position_size);
            return Err(self.deny(ViolationKind::PositionSize, market_id, details, now));
        }

        let total_exposure = ledger.total_exposure() + self.reserved_total();
        if total_exposure + proposed_size > limits.max_total_exposure {
            let details = format!(
                "total exposure {} + {} would exceed max {}",
                total_exposure, proposed_size, limits.max_total_exposure
            );
            return Err(self.deny(ViolationKind::TotalExposure, market_id, details, now));
        }

        let market_exposure = ledger.market_exposure(market_id) + self.reserved_for(market_id);
        if market_exposure + proposed_size > limits.max_single_market_exposure {
            let details = format!(
                "market exposure {} + {} would exceed max {}",
                market_exposure, proposed_size, limits.max_single_market_exposure
            );
            return Err(self.deny(ViolationKind::MarketExposure, market_id, details, now));
        }

        let (per_minute, per_hour) = self.rate.counts(now);
        if per_minute >= limits.max_orders_per_minute {
            let details = format!("{} orders in the last minute (max {})", per_minute, limits.max_orders_per_minute);
            return Err(self.deny(ViolationKind::OrderRateMinute, market_id, details, now));
        }
        if per_hour >= limits.max_orders_per_hour {
            let details = format!("{} orders in the last hour (max {})", per_hour, limits.max_orders_per_hour);
            return Err(self.deny(ViolationKind::OrderRateHour, market_id, details, now));
        }

        let drawdown = self.drawdown_pct();
        if drawdown <= -limits.max_drawdown_pct {
            let details = format!("drawdown {} at or below -{}", drawdown, limits.max_drawdown_pct);
            return Err(self.deny(ViolationKind::Drawdown, market_id, details, now));
        }

        Ok(())
    }

    fn deny(&mut self, kind: ViolationKind, market_id: &str, details: String, now: DateTime<Utc>) -> RiskViolation {
        let violation = RiskViolation {
            timestamp: now,
            kind,
            market_id: market_id.to_string(),
            details,
        };
        self.violation_count += 1;
        self.violations.push_back(violation.clone());
        while self.violations.len() > MAX_VIOLATION_LOG {
            self.violations.pop_front();
        }
        warn!(
            market = %market_id,
            kind = ?kind,
            details = %violation.details,
            "Trade denied by risk check"
        );
        violation
    }
}

/// Admission control and circuit breaker over a shared ledger.
pub struct RiskManager {
    ledger: Arc<PositionLedger>,
    inner: Mutex<Inner>,
}

impl RiskManager {
    pub fn new(ledger: Arc<PositionLedger>, config: &RiskConfig) -> Self {
        let now = Utc::now();
        Self {
            ledger,
            inner: Mutex::new(Inner {
                limits: RiskLimits::from(config),
                breaker: CircuitBreaker::new(Duration::minutes(config.cooldown_minutes)),
                rate: OrderRateWindow::new(),
                daily_reset: config.daily_reset,
                daily_window_start: now,
                session_pnl: Decimal::ZERO,
                daily_pnl: Decimal::ZERO,
                current_equity: config.initial_equity,
                peak_equity: config.initial_equity,
                consecutive_losses: 0,
                total_trades: 0,
                violation_count: 0,
                violations: VecDeque::new(),
                processed_trades: HashSet::new(),
                processed_order: VecDeque::new(),
                reservations: HashMap::new(),
            }),
        }
    }

    pub async fn can_trade(&self, market_id: &str, proposed_size: Decimal) -> Result<(), RiskViolation> {
        self.can_trade_at(market_id, proposed_size, Utc::now()).await
    }

    /// Dry-run admission: every check, nothing reserved or recorded.
    pub async fn can_trade_at(
        &self,
        market_id: &str,
        proposed_size: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), RiskViolation> {
        self.inner
            .lock()
            .await
            .check(&self.ledger, market_id, proposed_size, now)
    }

    pub async fn admit(&self, market_id: &str, size: Decimal) -> Result<Admission, RiskViolation> {
        self.admit_at(market_id, size, Utc::now()).await
    }

    /// Check, count the order slot and reserve `size`, all under one lock.
    pub async fn admit_at(
        &self,
        market_id: &str,
        size: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Admission, RiskViolation> {
        let mut inner = self.inner.lock().await;
        inner.check(&self.ledger, market_id, size, now)?;
        inner.rate.record(now);

        let id = Uuid::new_v4();
        inner.reservations.insert(id, (market_id.to_string(), size));
        debug!(market = %market_id, size = %size, reserved = %inner.reserved_total(), "Open admitted");
        Ok(Admission {
            id,
            market_id: market_id.to_string(),
            size,
        })
    }

    /// Drop a reservation. Call after the fill is in the ledger, or when
    /// nothing filled.
    pub async fn release(&self, admission: Admission) {
        let mut inner = self.inner.lock().await;
        if inner.reservations.remove(&admission.id).is_none() {
            warn!(market = %admission.market_id, "Release of unknown admission");
        }
    }

    pub async fn record_order(&self) {
        self.record_order_at(Utc::now()).await
    }

    /// Count one order attempt toward the rate windows.
    pub async fn record_order_at(&self, now: DateTime<Utc>) {
        self.inner.lock().await.rate.record(now);
    }

    pub async fn on_close(&self, trade: &TradeRecord) -> Option<TripReason> {
        self.on_close_at(trade, Utc::now()).await
    }

    /// Apply a closed trade. A trade id is only ever applied once.
    ///
    /// Returns the trip reason if this close tripped the breaker.
    pub async fn on_close_at(&self, trade: &TradeRecord, now: DateTime<Utc>) -> Option<TripReason> {
        let mut inner = self.inner.lock().await;
        if !inner.mark_processed(trade.id) {
            warn!(trade_id = %trade.id, market = %trade.market_id, "Duplicate close ignored");
            return None;
        }
        inner.maybe_reset_daily(now);

        let pnl = trade.net_pnl();
        inner.session_pnl += pnl;
        inner.daily_pnl += pnl;
        inner.current_equity += pnl;
        if inner.current_equity > inner.peak_equity {
            inner.peak_equity = inner.current_equity;
        }
        inner.total_trades += 1;
        if pnl < Decimal::ZERO {
            inner.consecutive_losses += 1;
        } else {
            inner.consecutive_losses = 0;
        }

        info!(
            trade_id = %trade.id,
            market = %trade.market_id,
            pnl = %pnl,
            session_pnl = %inner.session_pnl,
            daily_pnl = %inner.daily_pnl,
            consecutive_losses = inner.consecutive_losses,
            "Risk state updated after close"
        );

        let limits = inner.limits.clone();
        if !limits.circuit_breaker_enabled || inner.breaker.is_active(now) {
            return None;
        }

        let reason = if inner.consecutive_losses >= limits.max_consecutive_losses {
            Some(TripReason::ConsecutiveLosses)
        } else if inner.session_pnl <= -limits.emergency_stop_loss {
            Some(TripReason::EmergencyStop)
        } else {
            None
        };
        if let Some(reason) = reason {
            inner.breaker.trip(reason, None, now);
        }
        reason
    }

    /// Operator reset; also zeroes the consecutive-loss counter.
    pub async fn reset_circuit_breaker(&self) {
        let mut inner = self.inner.lock().await;
        inner.breaker.reset();
        inner.consecutive_losses = 0;
    }

    pub async fn trip_manual(&self, reason: &str) {
        self.trip_manual_at(reason, Utc::now()).await
    }

    pub async fn trip_manual_at(&self, reason: &str, now: DateTime<Utc>) {
        self.inner
            .lock()
            .await
            .breaker
            .trip(TripReason::Manual, Some(reason.to_string()), now);
    }

    /// Replace limits; effective on the next admission check.
    pub async fn update_limits(&self, limits: RiskLimits) {
        let mut inner = self.inner.lock().await;
        info!(?limits, "Risk limits updated");
        inner.limits = limits;
    }

    pub async fn limits(&self) -> RiskLimits {
        self.inner.lock().await.limits.clone()
    }

    pub async fn violations(&self) -> Vec<RiskViolation> {
        self.inner.lock().await.violations.iter().cloned().collect()
    }

    pub async fn status(&self) -> RiskState {
        self.status_at(Utc::now()).await
    }

    pub async fn status_at(&self, now: DateTime<Utc>) -> RiskState {
        let mut inner = self.inner.lock().await;
        inner.maybe_reset_daily(now);
        let active = inner.breaker.is_active(now);
        let (orders_last_minute, orders_last_hour) = inner.rate.counts(now);

        RiskState {
            session_pnl: inner.session_pnl,
            daily_pnl: inner.daily_pnl,
            current_equity: inner.current_equity,
            peak_equity: inner.peak_equity,
            drawdown_pct: inner.drawdown_pct(),
            open_positions: self.ledger.open_count(),
            total_exposure: self.ledger.total_exposure(),
            reserved_exposure: inner.reserved_total(),
            consecutive_losses: inner.consecutive_losses,
            total_trades: inner.total_trades,
            violations: inner.violation_count,
            orders_last_minute,
            orders_last_hour,
            circuit_breaker_active: active,
            circuit_breaker_until: inner.breaker.state().resume_at,
            trip_reason: inner.breaker.state().trip_reason,
            daily_window_start: inner.daily_window_start,
        }
    }
}
