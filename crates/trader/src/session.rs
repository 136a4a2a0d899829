//! Trading session: decision -> admission -> execution -> ledger -> risk.
//!
//! One session is shared by every market worker. Each market has its own
//! async mutex so that a market's read-modify-write sequence is serialized,
//! while markets otherwise proceed independently.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use polymarket_core::config::{ExecutionConfig, ExecutionMode};
use polymarket_core::types::{
    Action, Decision, MarketSnapshot, Position, PositionSide, PositionStatus, TradeRecord,
};
use polymarket_core::{Error, Result};
use risk_manager::{RiskLimits, RiskManager, RiskState, RiskViolation};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use trading_engine::{
    CloseRequest, ExecutionEngine, ExecutorStats, FillOutcome, FillReport, OpenRequest,
    PositionLedger,
};

/// Result of handling one decision.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Held,
    Denied { violation: RiskViolation },
    Opened { position: Position, report: FillReport },
    /// A full exit, or a partial one when the position is still open.
    Closed { trade: TradeRecord, report: FillReport },
    Unfilled { report: FillReport },
}

/// Operator view of the whole session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub mode: ExecutionMode,
    pub limits: RiskLimits,
    pub risk: RiskState,
    pub executor: ExecutorStats,
    pub open_positions: Vec<Position>,
    pub timestamp: DateTime<Utc>,
}

pub struct TradingSession {
    ledger: Arc<PositionLedger>,
    risk: Arc<RiskManager>,
    engine: RwLock<Arc<dyn ExecutionEngine>>,
    base_position_size: Decimal,
    market_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TradingSession {
    pub fn new(
        ledger: Arc<PositionLedger>,
        risk: Arc<RiskManager>,
        engine: Arc<dyn ExecutionEngine>,
        execution: &ExecutionConfig,
    ) -> Self {
        info!(
            mode = %engine.mode(),
            base_position_size = %execution.base_position_size,
            "Trading session created"
        );
        Self {
            ledger,
            risk,
            engine: RwLock::new(engine),
            base_position_size: execution.base_position_size,
            market_locks: DashMap::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<PositionLedger> {
        &self.ledger
    }

    pub fn risk(&self) -> &Arc<RiskManager> {
        &self.risk
    }

    fn market_lock(&self, market_id: &str) -> Arc<Mutex<()>> {
        self.market_locks
            .entry(market_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn engine(&self) -> Arc<dyn ExecutionEngine> {
        self.engine.read().await.clone()
    }

    /// Handle one strategy decision against the latest snapshot.
    ///
    /// Admission denials and unfilled orders are outcomes; invariant
    /// violations (duplicate open, close on a flat market) are errors.
    pub async fn handle(&self, snapshot: &MarketSnapshot, decision: &Decision) -> Result<DecisionOutcome> {
        if decision.action == Action::Hold {
            return Ok(DecisionOutcome::Held);
        }
        snapshot.validate()?;

        let lock = self.market_lock(&snapshot.market_id);
        let _guard = lock.lock().await;

        match decision.open_side() {
            Some(side) => self.open(snapshot, side, decision.size_multiplier).await,
            None => self.close(snapshot, decision.urgent).await,
        }
    }

    async fn open(
        &self,
        snapshot: &MarketSnapshot,
        side: PositionSide,
        multiplier: Decimal,
    ) -> Result<DecisionOutcome> {
        let market_id = snapshot.market_id.as_str();
        if multiplier <= Decimal::ZERO {
            return Err(Error::InvalidDecision(format!(
                "{}: size multiplier must be positive, got {}",
                market_id, multiplier
            )));
        }
        if let Some(existing) = self.ledger.get(market_id) {
            error!(
                market = %market_id,
                existing_side = %existing.side,
                requested_side = %side,
                "Open requested on a market that already holds a position"
            );
            return Err(Error::AlreadyOpen {
                market_id: market_id.to_string(),
            });
        }

        let notional = self.base_position_size * multiplier;
        let admission = match self.risk.admit(market_id, notional).await {
            Ok(admission) => admission,
            Err(violation) => return Ok(DecisionOutcome::Denied { violation }),
        };

        let engine = self.engine().await;
        let report = engine
            .attempt_open(&OpenRequest {
                snapshot: snapshot.clone(),
                side,
                notional,
            })
            .await;

        if !report.has_fill() {
            self.risk.release(admission).await;
            warn!(
                market = %market_id,
                outcome = ?report.outcome,
                error = ?report.error_message,
                "Open attempt left no fill"
            );
            return Ok(DecisionOutcome::Unfilled { report });
        }

        let position = match self.book_entry(snapshot, side, &report) {
            Ok(position) => position,
            Err(e) => {
                // The reservation stays in place so the unbooked fill still
                // counts toward exposure until an operator reconciles it.
                error!(
                    market = %market_id,
                    order_id = ?report.order_id,
                    filled = %report.filled_size,
                    avg_price = ?report.avg_fill_price,
                    reserved = %admission.size(),
                    error = %e,
                    "Entry fill could not be booked, halting opens"
                );
                self.risk
                    .trip_manual(&format!("unbooked entry fill on {}", market_id))
                    .await;
                return Err(e);
            }
        };
        self.risk.release(admission).await;

        info!(
            market = %market_id,
            side = %side,
            size = %position.size,
            entry_price = %position.entry_price,
            outcome = ?report.outcome,
            "Position opened"
        );
        Ok(DecisionOutcome::Opened { position, report })
    }

    /// Create the position from the first increment and fold in the rest.
    fn book_entry(&self, snapshot: &MarketSnapshot, side: PositionSide, report: &FillReport) -> Result<Position> {
        let mut increments = report.increments.iter().filter(|i| i.size > Decimal::ZERO);
        let Some(first) = increments.next() else {
            return Err(Error::InvalidPosition(format!(
                "{}: fill reported without increments",
                snapshot.market_id
            )));
        };

        let mut position = Position::open(
            snapshot.market_id.clone(),
            snapshot.asset.clone(),
            side,
            first.notional(),
            first.price,
        )?
        .with_costs(report.fees, report.slippage);
        position.entry_time = report.completed_at;
        if let Some(order_id) = &report.order_id {
            position = position.with_order_id(order_id.clone());
        }

        let mut position = self.ledger.insert(position)?;
        for increment in increments {
            position = self
                .ledger
                .apply_fill(&snapshot.market_id, increment.notional(), increment.price)?;
        }
        Ok(position)
    }

    async fn close(&self, snapshot: &MarketSnapshot, urgent: bool) -> Result<DecisionOutcome> {
        let market_id = snapshot.market_id.as_str();
        let Some(position) = self.ledger.get(market_id) else {
            error!(market = %market_id, "Close requested on a flat market");
            return Err(Error::NoOpenPosition {
                market_id: market_id.to_string(),
            });
        };

        // Exits reduce exposure and are never gated by admission checks.
        self.ledger.mark_closing(market_id)?;
        self.risk.record_order().await;

        let engine = self.engine().await;
        let request = CloseRequest {
            snapshot: snapshot.clone(),
            position: position.clone(),
        };
        let report = if urgent {
            engine.attempt_exit_now(&request).await
        } else {
            engine.attempt_close(&request).await
        };

        let exit_price = match report.avg_fill_price {
            Some(price) if report.has_fill() => price,
            _ => {
                self.ledger.revert_closing(market_id)?;
                warn!(
                    market = %market_id,
                    outcome = ?report.outcome,
                    error = ?report.error_message,
                    "Exit attempt left no fill, position kept open"
                );
                return Ok(DecisionOutcome::Unfilled { report });
            }
        };

        let trade = match self.book_exit(market_id, exit_price, &report) {
            Ok(trade) => trade,
            Err(e) => {
                let still_closing = self
                    .ledger
                    .get(market_id)
                    .is_some_and(|p| p.status == PositionStatus::Closing);
                if still_closing {
                    if let Err(revert) = self.ledger.revert_closing(market_id) {
                        error!(market = %market_id, error = %revert, "Could not reopen position after failed exit booking");
                    }
                }
                error!(
                    market = %market_id,
                    order_id = ?report.order_id,
                    filled = %report.filled_size,
                    exit_price = %exit_price,
                    error = %e,
                    "Exit fill could not be booked, halting opens"
                );
                self.risk
                    .trip_manual(&format!("unbooked exit fill on {}", market_id))
                    .await;
                return Err(e);
            }
        };

        if let Some(reason) = self.risk.on_close(&trade).await {
            warn!(market = %market_id, reason = ?reason, "Close tripped the circuit breaker");
        }
        Ok(DecisionOutcome::Closed { trade, report })
    }

    /// Apply an exit fill to the ledger.
    ///
    /// Once a trade record exists, later bookkeeping failures are logged
    /// and the trade is still returned so risk sees it.
    fn book_exit(&self, market_id: &str, exit_price: Decimal, report: &FillReport) -> Result<TradeRecord> {
        if report.outcome == FillOutcome::Filled {
            return self.ledger.close_with_costs(
                market_id,
                exit_price,
                report.completed_at,
                report.fees,
                report.slippage,
            );
        }

        let trade = self
            .ledger
            .reduce(market_id, report.filled_size, exit_price, report.completed_at)?;
        if self.ledger.is_open(market_id) {
            if let Err(e) = self.ledger.add_costs(market_id, report.fees, report.slippage) {
                error!(market = %market_id, error = %e, "Exit costs not recorded");
            }
            if let Err(e) = self.ledger.revert_closing(market_id) {
                error!(market = %market_id, error = %e, "Could not reopen partially exited position");
            }
            warn!(
                market = %market_id,
                filled = %report.filled_size,
                requested = %report.requested_size,
                "Exit partially filled, remainder kept open"
            );
        }
        Ok(trade)
    }

    /// Close a position at market expiry.
    pub async fn settle_market(&self, market_id: &str, settlement_price: Decimal) -> Result<TradeRecord> {
        let lock = self.market_lock(market_id);
        let _guard = lock.lock().await;

        let trade = self.ledger.settle(market_id, settlement_price, Utc::now())?;
        self.risk.on_close(&trade).await;
        Ok(trade)
    }

    /// Swap the execution engine; in-flight orders on the old one finish.
    pub async fn set_engine(&self, engine: Arc<dyn ExecutionEngine>) {
        let mut current = self.engine.write().await;
        info!(from = %current.mode(), to = %engine.mode(), "Execution engine switched");
        *current = engine;
    }

    pub async fn mode(&self) -> ExecutionMode {
        self.engine.read().await.mode()
    }

    pub async fn update_limits(&self, limits: RiskLimits) {
        self.risk.update_limits(limits).await;
    }

    pub async fn reset_circuit_breaker(&self) {
        self.risk.reset_circuit_breaker().await;
    }

    /// Operator halt; lasts one cooldown unless reset earlier.
    pub async fn trip_circuit_breaker(&self, reason: &str) {
        self.risk.trip_manual(reason).await;
    }

    pub async fn cancel_order(&self, order_id: &str) -> bool {
        self.engine().await.cancel(order_id).await
    }

    pub async fn status(&self) -> SessionStatus {
        let engine = self.engine().await;
        SessionStatus {
            mode: engine.mode(),
            limits: self.risk.limits().await,
            risk: self.risk.status().await,
            executor: engine.stats(),
            open_positions: self.ledger.open_positions(),
            timestamp: Utc::now(),
        }
    }

    pub fn trade_history(&self) -> Vec<TradeRecord> {
        self.ledger.trade_history()
    }

    pub async fn violations(&self) -> Vec<RiskViolation> {
        self.risk.violations().await
    }

    /// Stop accepting work and let in-flight orders reach a terminal state.
    pub async fn shutdown(&self) {
        let engine = self.engine().await;
        info!(mode = %engine.mode(), open_positions = self.ledger.open_count(), "Session shutting down");
        engine.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymarket_core::config::RiskConfig;
    use risk_manager::ViolationKind;
    use trading_engine::{GatewayConfig, LiveGateway, PaperEngine, SimulatedFill, SimulatedVenue};

    fn snapshot(market: &str) -> MarketSnapshot {
        MarketSnapshot::new(market, "BTC", "tok-up", Decimal::new(48, 2), Decimal::new(52, 2))
            .with_depth(Decimal::new(500, 0), Decimal::new(2000, 0))
    }

    fn session_with(engine: Arc<dyn ExecutionEngine>, risk: RiskConfig) -> TradingSession {
        let ledger = Arc::new(PositionLedger::new());
        let manager = Arc::new(RiskManager::new(ledger.clone(), &risk));
        TradingSession::new(ledger, manager, engine, &ExecutionConfig::default())
    }

    fn paper_session() -> TradingSession {
        session_with(Arc::new(PaperEngine::default()), RiskConfig::default())
    }

    #[tokio::test]
    async fn test_hold_is_a_no_op() {
        let session = paper_session();
        let outcome = session.handle(&snapshot("m1"), &Decision::hold()).await.unwrap();
        assert!(matches!(outcome, DecisionOutcome::Held));
        assert_eq!(session.status().await.risk.orders_last_minute, 0);
    }

    #[tokio::test]
    async fn test_paper_open_then_close() {
        let session = paper_session();
        let outcome = session.handle(&snapshot("m1"), &Decision::open_long()).await.unwrap();
        let DecisionOutcome::Opened { position, .. } = outcome else {
            panic!("expected open, got {:?}", outcome);
        };
        assert_eq!(position.size, Decimal::new(100, 0));
        assert_eq!(position.entry_price, Decimal::new(50, 2));
        assert!(position.order_id.is_some());

        let exit = MarketSnapshot::new("m1", "BTC", "tok-up", Decimal::new(58, 2), Decimal::new(62, 2));
        let outcome = session.handle(&exit, &Decision::close()).await.unwrap();
        let DecisionOutcome::Closed { trade, .. } = outcome else {
            panic!("expected close, got {:?}", outcome);
        };
        // 200 shares * 0.10
        assert_eq!(trade.pnl, Decimal::new(20, 0));
        assert!(!session.ledger().is_open("m1"));

        let status = session.status().await;
        assert_eq!(status.risk.session_pnl, Decimal::new(20, 0));
        assert_eq!(status.risk.orders_last_minute, 2);
        assert_eq!(status.executor.total_fills, 2);
    }

    #[tokio::test]
    async fn test_duplicate_open_is_an_error() {
        let session = paper_session();
        session.handle(&snapshot("m1"), &Decision::open_short()).await.unwrap();
        let err = session
            .handle(&snapshot("m1"), &Decision::open_long())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyOpen { .. }));
        assert_eq!(session.ledger().open_count(), 1);
    }

    #[tokio::test]
    async fn test_close_on_flat_market_leaves_risk_untouched() {
        let session = paper_session();
        let err = session.handle(&snapshot("m1"), &Decision::close()).await.unwrap_err();
        assert!(matches!(err, Error::NoOpenPosition { .. }));
        assert_eq!(session.status().await.risk.total_trades, 0);
    }

    #[tokio::test]
    async fn test_denied_open_reports_violation() {
        let session = session_with(
            Arc::new(PaperEngine::default()),
            RiskConfig {
                max_position_size: Decimal::new(150, 0),
                ..Default::default()
            },
        );
        let decision = Decision::open_long().with_multiplier(Decimal::TWO);
        let outcome = session.handle(&snapshot("m1"), &decision).await.unwrap();
        let DecisionOutcome::Denied { violation } = outcome else {
            panic!("expected denial, got {:?}", outcome);
        };
        assert_eq!(violation.kind, ViolationKind::PositionSize);
        assert_eq!(session.violations().await.len(), 1);
        assert_eq!(session.ledger().open_count(), 0);
    }

    #[tokio::test]
    async fn test_non_positive_multiplier_rejected() {
        let session = paper_session();
        let decision = Decision::open_long().with_multiplier(Decimal::ZERO);
        let err = session.handle(&snapshot("m1"), &decision).await.unwrap_err();
        assert!(matches!(err, Error::InvalidDecision(_)));
    }

    #[tokio::test]
    async fn test_settlement_feeds_risk() {
        let session = paper_session();
        session.handle(&snapshot("m1"), &Decision::open_short()).await.unwrap();
        let trade = session.settle_market("m1", Decimal::ZERO).await.unwrap();
        // short 200 shares from 0.50 to 0
        assert_eq!(trade.pnl, Decimal::new(100, 0));
        assert_eq!(session.status().await.risk.total_trades, 1);
        assert!(session.settle_market("m1", Decimal::ZERO).await.is_err());
    }

    #[tokio::test]
    async fn test_manual_trip_blocks_opens() {
        let session = paper_session();
        session.trip_circuit_breaker("maintenance").await;
        let outcome = session.handle(&snapshot("m1"), &Decision::open_long()).await.unwrap();
        assert!(matches!(outcome, DecisionOutcome::Denied { .. }));

        session.reset_circuit_breaker().await;
        let outcome = session.handle(&snapshot("m1"), &Decision::open_long()).await.unwrap();
        assert!(matches!(outcome, DecisionOutcome::Opened { .. }));
    }

    fn mock_engine(behaviour: SimulatedFill) -> (Arc<SimulatedVenue>, Arc<dyn ExecutionEngine>) {
        let venue = Arc::new(SimulatedVenue::new(behaviour));
        let gateway = LiveGateway::new(venue.clone(), GatewayConfig::default(), ExecutionMode::Mock);
        (venue, Arc::new(gateway))
    }

    #[tokio::test(start_paused = true)]
    async fn test_unfilled_live_open_creates_no_position() {
        let (_, engine) = mock_engine(SimulatedFill::never());
        let session = session_with(engine, RiskConfig::default());
        let outcome = session.handle(&snapshot("m1"), &Decision::open_long()).await.unwrap();
        let DecisionOutcome::Unfilled { report } = outcome else {
            panic!("expected unfilled, got {:?}", outcome);
        };
        assert_eq!(report.outcome, FillOutcome::Cancelled);
        assert_eq!(report.filled_size, Decimal::ZERO);
        assert_eq!(session.ledger().open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_live_open_books_reduced_size() {
        let (_, engine) = mock_engine(SimulatedFill::partial(Decimal::new(92, 2)));
        let session = session_with(engine, RiskConfig::default());
        let outcome = session.handle(&snapshot("m1"), &Decision::open_long()).await.unwrap();
        let DecisionOutcome::Opened { position, report } = outcome else {
            panic!("expected open, got {:?}", outcome);
        };
        assert_eq!(report.outcome, FillOutcome::PartialAccepted);
        assert!(position.size < Decimal::new(100, 0));
        assert_eq!(position.size, report.filled_notional());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unfilled_live_close_keeps_position_open() {
        let (venue, engine) = mock_engine(SimulatedFill::default());
        let session = session_with(engine, RiskConfig::default());
        session.handle(&snapshot("m1"), &Decision::open_short()).await.unwrap();

        venue.set_behaviour(SimulatedFill::never());
        let outcome = session.handle(&snapshot("m1"), &Decision::close()).await.unwrap();
        assert!(matches!(outcome, DecisionOutcome::Unfilled { .. }));
        let position = session.ledger().get("m1").unwrap();
        assert_eq!(position.status, PositionStatus::Open);
        assert_eq!(session.status().await.risk.total_trades, 0);
    }

    #[tokio::test]
    async fn test_engine_switch() {
        let session = paper_session();
        assert_eq!(session.mode().await, ExecutionMode::Paper);
        let (_, engine) = mock_engine(SimulatedFill::default());
        session.set_engine(engine).await;
        assert_eq!(session.mode().await, ExecutionMode::Mock);
        assert!(!session.cancel_order("unknown").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_opens_respect_total_exposure() {
        let (_, engine) = mock_engine(SimulatedFill::default());
        let session = session_with(
            engine,
            RiskConfig {
                max_total_exposure: Decimal::new(150, 0),
                ..Default::default()
            },
        );

        let (snap_a, snap_b) = (snapshot("a"), snapshot("b"));
        let (dec_a, dec_b) = (Decision::open_long(), Decision::open_long());
        let (a, b) = tokio::join!(
            session.handle(&snap_a, &dec_a),
            session.handle(&snap_b, &dec_b)
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        let opened = outcomes
            .iter()
            .filter(|o| matches!(o, DecisionOutcome::Opened { .. }))
            .count();
        let denied: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match o {
                DecisionOutcome::Denied { violation } => Some(violation.kind),
                _ => None,
            })
            .collect();
        assert_eq!(opened, 1);
        assert_eq!(denied, vec![ViolationKind::TotalExposure]);

        let status = session.status().await;
        assert!(status.risk.total_exposure <= Decimal::new(150, 0));
        assert_eq!(status.risk.reserved_exposure, Decimal::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unfilled_open_releases_reservation() {
        let (venue, engine) = mock_engine(SimulatedFill::never());
        let session = session_with(
            engine,
            RiskConfig {
                max_total_exposure: Decimal::new(150, 0),
                ..Default::default()
            },
        );
        let outcome = session.handle(&snapshot("a"), &Decision::open_long()).await.unwrap();
        assert!(matches!(outcome, DecisionOutcome::Unfilled { .. }));
        assert_eq!(session.status().await.risk.reserved_exposure, Decimal::ZERO);

        venue.set_behaviour(SimulatedFill::default());
        let outcome = session.handle(&snapshot("b"), &Decision::open_long()).await.unwrap();
        assert!(matches!(outcome, DecisionOutcome::Opened { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbookable_entry_fill_halts_and_keeps_exposure() {
        // Buy limit 0.492 filled 0.6 worse: an entry price above 1.
        let (_, engine) = mock_engine(SimulatedFill {
            price_offset: Decimal::new(6, 1),
            ..Default::default()
        });
        let session = session_with(engine, RiskConfig::default());

        let err = session.handle(&snapshot("m1"), &Decision::open_long()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPosition(_)));
        assert!(!session.ledger().is_open("m1"));

        let status = session.status().await;
        assert!(status.risk.circuit_breaker_active);
        assert_eq!(status.risk.reserved_exposure, Decimal::new(100, 0));
        let outcome = session.handle(&snapshot("m2"), &Decision::open_long()).await.unwrap();
        assert!(matches!(
            outcome,
            DecisionOutcome::Denied { violation } if violation.kind == ViolationKind::CircuitBreaker
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbookable_full_exit_reopens_position() {
        let (venue, engine) = mock_engine(SimulatedFill::default());
        let session = session_with(engine, RiskConfig::default());
        session.handle(&snapshot("m1"), &Decision::open_long()).await.unwrap();

        // Sell limit 0.508 filled 0.6 worse: an exit price below 0.
        venue.set_behaviour(SimulatedFill {
            price_offset: Decimal::new(6, 1),
            ..Default::default()
        });
        let err = session.handle(&snapshot("m1"), &Decision::close()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPosition(_)));

        let position = session.ledger().get("m1").unwrap();
        assert_eq!(position.status, PositionStatus::Open);
        let status = session.status().await;
        assert!(status.risk.circuit_breaker_active);
        assert_eq!(status.risk.total_trades, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbookable_partial_exit_reopens_position() {
        let (venue, engine) = mock_engine(SimulatedFill::default());
        let session = session_with(engine, RiskConfig::default());
        session.handle(&snapshot("m1"), &Decision::open_long()).await.unwrap();

        venue.set_behaviour(SimulatedFill {
            fill_ratio: Decimal::new(5, 1),
            price_offset: Decimal::new(6, 1),
            ..Default::default()
        });
        let err = session.handle(&snapshot("m1"), &Decision::close()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPosition(_)));
        assert_eq!(session.ledger().get("m1").unwrap().status, PositionStatus::Open);
        assert!(session.status().await.risk.circuit_breaker_active);

        // The position can still be exited normally afterwards.
        venue.set_behaviour(SimulatedFill::default());
        let outcome = session.handle(&snapshot("m1"), &Decision::close()).await.unwrap();
        assert!(matches!(outcome, DecisionOutcome::Closed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_urgent_exit_crosses_the_book() {
        let (venue, engine) = mock_engine(SimulatedFill::default());
        let session = session_with(engine, RiskConfig::default());
        session.handle(&snapshot("m1"), &Decision::open_long()).await.unwrap();

        let outcome = session.handle(&snapshot("m1"), &Decision::exit_now()).await.unwrap();
        let DecisionOutcome::Closed { trade, report } = outcome else {
            panic!("expected close, got {:?}", outcome);
        };
        assert_eq!(report.limit_price, Decimal::new(1, 2));
        assert_eq!(trade.exit_price, Decimal::new(1, 2));
        assert!(!session.ledger().is_open("m1"));
        assert_eq!(venue.cancels(), 0);
    }
}
