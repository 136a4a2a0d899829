//! Risk Manager
//!
//! Pre-trade admission checks, post-trade accounting, and the circuit
//! breaker that halts trading after losses.

pub mod circuit_breaker;
pub mod limits;
pub mod manager;
pub mod rate_window;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState, TripReason};
pub use limits::RiskLimits;
pub use manager::{Admission, RiskManager, RiskState, RiskViolation, ViolationKind};
