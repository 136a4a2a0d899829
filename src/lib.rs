//! Up/Down Bot: execution and risk core for 15-minute prediction markets
//!
//! The root crate re-exports the workspace for integration tests and
//! benchmarks. For actual functionality, use the individual crates directly:
//!
//! - `polymarket-core`: Domain types, configuration, CLOB order client
//! - `trading-engine`: Ledger, cost model, paper and live execution
//! - `risk-manager`: Admission checks, post-trade accounting, circuit breaker
//! - `trader`: Trading session, operator controls, the `trader` binary

pub use polymarket_core as core;
pub use risk_manager as risk;
pub use trader as session;
pub use trading_engine as trading;
