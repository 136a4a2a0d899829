//! API clients for external services.

pub mod clob;

pub use clob::{ApiCredentials, ClobOrderClient, OrderStatusResponse, OrderType, PostOrderResponse};
