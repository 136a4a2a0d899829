//! Polymarket Core Library
//!
//! Shared types, configuration, and the CLOB order client for trading
//! 15-minute up/down prediction markets.

pub mod api;
pub mod config;
pub mod error;
pub mod signing;
pub mod types;

pub use error::{Error, Result};
