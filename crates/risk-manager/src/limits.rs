//! Operator-configured risk limits.

use polymarket_core::config::RiskConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Hard limits enforced on every admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Largest notional for a single position.
    pub max_position_size: Decimal,
    /// Cap on the sum of open notionals.
    pub max_total_exposure: Decimal,
    pub max_single_market_exposure: Decimal,
    pub max_daily_loss: Decimal,
    /// Fraction of peak equity, e.g. 0.30.
    pub max_drawdown_pct: Decimal,
    pub max_consecutive_losses: u32,
    pub max_orders_per_minute: u32,
    pub max_orders_per_hour: u32,
    /// Session loss at which trading halts.
    pub emergency_stop_loss: Decimal,
    pub circuit_breaker_enabled: bool,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self::from(&RiskConfig::default())
    }
}

impl From<&RiskConfig> for RiskLimits {
    fn from(config: &RiskConfig) -> Self {
        Self {
            max_position_size: config.max_position_size,
            max_total_exposure: config.max_total_exposure,
            max_single_market_exposure: config.max_single_market_exposure,
            max_daily_loss: config.max_daily_loss,
            max_drawdown_pct: config.max_drawdown_pct,
            max_consecutive_losses: config.max_consecutive_losses,
            max_orders_per_minute: config.max_orders_per_minute,
            max_orders_per_hour: config.max_orders_per_hour,
            emergency_stop_loss: config.emergency_stop_loss,
            circuit_breaker_enabled: config.circuit_breaker_enabled,
        }
    }
}
