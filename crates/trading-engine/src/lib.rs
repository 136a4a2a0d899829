//! Trading Engine
//!
//! Position ledger, cost model, and the paper and live execution engines
//! for 15-minute up/down markets.

pub mod cost_model;
pub mod engine;
pub mod ledger;
pub mod live;
pub mod paper;
pub mod stats;
pub mod venue;

pub use cost_model::{CostEstimate, CostModel};
pub use engine::{CloseRequest, ExecutionEngine, FillOutcome, FillReport, OpenRequest};
pub use ledger::{LedgerStats, PositionLedger};
pub use live::{GatewayConfig, LiveGateway};
pub use paper::PaperEngine;
pub use stats::{ExecutorStats, ExecutorStatsAggregator};
pub use venue::{ClobVenue, SimulatedFill, SimulatedVenue, Venue, VenueError, VenueOrderStatus};
