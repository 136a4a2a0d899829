//! Trader
//!
//! Orchestrates decisions through risk admission, execution and the
//! position ledger, and exposes operator controls over a running session.

pub mod engine;
pub mod feed;
pub mod session;

pub use engine::build_engine;
pub use feed::{parse_line, FeedMessage, Settlement};
pub use session::{DecisionOutcome, SessionStatus, TradingSession};
