//! Configuration management for the up/down trader.

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub polymarket: PolymarketConfig,
}

/// Which execution engine handles decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Instant simulated fills at mid.
    #[default]
    Paper,
    /// Live gateway against a simulated venue.
    Mock,
    /// Live gateway against the CLOB.
    Live,
}

impl FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "paper" => Ok(ExecutionMode::Paper),
            "mock" => Ok(ExecutionMode::Mock),
            "live" => Ok(ExecutionMode::Live),
            other => Err(Error::Config {
                message: format!("Unknown execution mode: {}", other),
            }),
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Paper => write!(f, "paper"),
            ExecutionMode::Mock => write!(f, "mock"),
            ExecutionMode::Live => write!(f, "live"),
        }
    }
}

/// When the daily P&L counter resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyResetMode {
    /// At each UTC midnight.
    #[default]
    UtcDay,
    /// 24 hours after the last reset.
    Rolling24h,
}

impl FromStr for DailyResetMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "utc_day" => Ok(DailyResetMode::UtcDay),
            "rolling_24h" => Ok(DailyResetMode::Rolling24h),
            other => Err(Error::Config {
                message: format!("Unknown daily reset mode: {}", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    /// Notional per decision before the size multiplier.
    pub base_position_size: Decimal,
    /// How far into the spread limit orders are placed.
    pub spread_fraction: Decimal,
    pub poll_interval_ms: u64,
    pub order_timeout_ms: u64,
    /// Fraction of the requested size accepted as a complete fill at timeout.
    pub partial_fill_threshold: Decimal,
    pub order_expiration_secs: i64,
    pub price_tick: Decimal,
    pub size_step: Decimal,
    /// Venue fee charged on filled notional.
    pub fee_rate: Decimal,
    /// Bound on the post-deadline cancel and final status read.
    pub settle_timeout_ms: u64,
    /// Absolute deadline for fill-or-kill exits.
    pub aggressive_timeout_ms: u64,
    /// Marketable limit for an aggressive buy.
    pub aggressive_buy_price: Decimal,
    /// Marketable limit for an aggressive sell.
    pub aggressive_sell_price: Decimal,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Paper,
            base_position_size: Decimal::new(100, 0),
            spread_fraction: Decimal::new(3, 1),
            poll_interval_ms: 100,
            order_timeout_ms: 5000,
            partial_fill_threshold: Decimal::new(9, 1),
            order_expiration_secs: 3600,
            price_tick: Decimal::new(1, 3),
            size_step: Decimal::new(1, 2),
            fee_rate: Decimal::ZERO,
            settle_timeout_ms: 250,
            aggressive_timeout_ms: 2000,
            aggressive_buy_price: Decimal::new(99, 2),
            aggressive_sell_price: Decimal::new(1, 2),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_position_size: Decimal,
    pub max_total_exposure: Decimal,
    pub max_single_market_exposure: Decimal,
    pub max_daily_loss: Decimal,
    pub max_drawdown_pct: Decimal,
    pub max_consecutive_losses: u32,
    pub max_orders_per_minute: u32,
    pub max_orders_per_hour: u32,
    pub emergency_stop_loss: Decimal,
    pub circuit_breaker_enabled: bool,
    pub cooldown_minutes: i64,
    pub initial_equity: Decimal,
    pub daily_reset: DailyResetMode,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: Decimal::new(500, 0),
            max_total_exposure: Decimal::new(2000, 0),
            max_single_market_exposure: Decimal::new(1000, 0),
            max_daily_loss: Decimal::new(1000, 0),
            max_drawdown_pct: Decimal::new(30, 2),
            max_consecutive_losses: 10,
            max_orders_per_minute: 30,
            max_orders_per_hour: 500,
            emergency_stop_loss: Decimal::new(2000, 0),
            circuit_breaker_enabled: true,
            cooldown_minutes: 30,
            initial_equity: Decimal::new(10000, 0),
            daily_reset: DailyResetMode::UtcDay,
        }
    }
}

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolymarketConfig {
    pub clob_url: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub api_passphrase: Option<String>,
    /// Funder address sent as POLY_ADDRESS.
    pub address: Option<String>,
    /// Hex key that signs orders as maker.
    pub private_key: Option<String>,
    /// Sign against the neg-risk exchange instead of the standard one.
    pub neg_risk: bool,
}

impl PolymarketConfig {
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
            && self.api_secret.is_some()
            && self.api_passphrase.is_some()
            && self.address.is_some()
            && self.private_key.is_some()
    }
}

impl std::fmt::Debug for PolymarketConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("PolymarketConfig")
            .field("clob_url", &self.clob_url)
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &redact(&self.api_secret))
            .field("api_passphrase", &redact(&self.api_passphrase))
            .field("address", &self.address)
            .field("private_key", &redact(&self.private_key))
            .field("neg_risk", &self.neg_risk)
            .finish()
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let exec_defaults = ExecutionConfig::default();
        let risk_defaults = RiskConfig::default();

        let mode = match env::var("EXECUTION_MODE") {
            Ok(s) => s.parse()?,
            Err(_) => ExecutionMode::Paper,
        };
        let daily_reset = match env::var("RISK_DAILY_RESET") {
            Ok(s) => s.parse()?,
            Err(_) => DailyResetMode::UtcDay,
        };

        let config = Self {
            execution: ExecutionConfig {
                mode,
                base_position_size: env_parse("BASE_POSITION_SIZE", exec_defaults.base_position_size),
                spread_fraction: env_parse("SPREAD_FRACTION", exec_defaults.spread_fraction),
                poll_interval_ms: env_parse("POLL_INTERVAL_MS", exec_defaults.poll_interval_ms),
                order_timeout_ms: env_parse("ORDER_TIMEOUT_MS", exec_defaults.order_timeout_ms),
                partial_fill_threshold: env_parse(
                    "PARTIAL_FILL_THRESHOLD",
                    exec_defaults.partial_fill_threshold,
                ),
                order_expiration_secs: env_parse(
                    "ORDER_EXPIRATION_SECS",
                    exec_defaults.order_expiration_secs,
                ),
                price_tick: env_parse("PRICE_TICK", exec_defaults.price_tick),
                size_step: env_parse("SIZE_STEP", exec_defaults.size_step),
                fee_rate: env_parse("FEE_RATE", exec_defaults.fee_rate),
                settle_timeout_ms: env_parse("SETTLE_TIMEOUT_MS", exec_defaults.settle_timeout_ms),
                aggressive_timeout_ms: env_parse("AGGRESSIVE_TIMEOUT_MS", exec_defaults.aggressive_timeout_ms),
                aggressive_buy_price: env_parse("AGGRESSIVE_BUY_PRICE", exec_defaults.aggressive_buy_price),
                aggressive_sell_price: env_parse("AGGRESSIVE_SELL_PRICE", exec_defaults.aggressive_sell_price),
            },
            risk: RiskConfig {
                max_position_size: env_parse("RISK_MAX_POSITION_SIZE", risk_defaults.max_position_size),
                max_total_exposure: env_parse("RISK_MAX_TOTAL_EXPOSURE", risk_defaults.max_total_exposure),
                max_single_market_exposure: env_parse(
                    "RISK_MAX_SINGLE_MARKET_EXPOSURE",
                    risk_defaults.max_single_market_exposure,
                ),
                max_daily_loss: env_parse("RISK_MAX_DAILY_LOSS", risk_defaults.max_daily_loss),
                max_drawdown_pct: env_parse("RISK_MAX_DRAWDOWN_PCT", risk_defaults.max_drawdown_pct),
                max_consecutive_losses: env_parse(
                    "RISK_MAX_CONSECUTIVE_LOSSES",
                    risk_defaults.max_consecutive_losses,
                ),
                max_orders_per_minute: env_parse(
                    "RISK_MAX_ORDERS_PER_MINUTE",
                    risk_defaults.max_orders_per_minute,
                ),
                max_orders_per_hour: env_parse("RISK_MAX_ORDERS_PER_HOUR", risk_defaults.max_orders_per_hour),
                emergency_stop_loss: env_parse("RISK_EMERGENCY_STOP_LOSS", risk_defaults.emergency_stop_loss),
                circuit_breaker_enabled: env_parse(
                    "RISK_CIRCUIT_BREAKER_ENABLED",
                    risk_defaults.circuit_breaker_enabled,
                ),
                cooldown_minutes: env_parse("RISK_COOLDOWN_MINUTES", risk_defaults.cooldown_minutes),
                initial_equity: env_parse("RISK_INITIAL_EQUITY", risk_defaults.initial_equity),
                daily_reset,
            },
            polymarket: PolymarketConfig {
                clob_url: env::var("POLYMARKET_CLOB_URL").ok(),
                api_key: env::var("POLY_API_KEY").ok(),
                api_secret: env::var("POLY_API_SECRET").ok(),
                api_passphrase: env::var("POLY_API_PASSPHRASE").ok(),
                address: env::var("POLY_ADDRESS").ok(),
                private_key: env::var("POLY_PRIVATE_KEY").ok(),
                neg_risk: env_parse("POLY_NEG_RISK", false),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file with `TRADER__SECTION__KEY` environment overrides.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config: Self = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("TRADER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no engine can run with.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        let exec = &self.execution;
        if exec.base_position_size <= Decimal::ZERO {
            return Err(Error::Config {
                message: "base_position_size must be positive".to_string(),
            });
        }
        if exec.spread_fraction < Decimal::ZERO || exec.spread_fraction > Decimal::ONE {
            return Err(Error::Config {
                message: "spread_fraction must be within [0, 1]".to_string(),
            });
        }
        if exec.partial_fill_threshold <= Decimal::ZERO || exec.partial_fill_threshold > Decimal::ONE {
            return Err(Error::Config {
                message: "partial_fill_threshold must be within (0, 1]".to_string(),
            });
        }
        if exec.poll_interval_ms == 0 || exec.order_timeout_ms == 0 {
            return Err(Error::Config {
                message: "poll_interval_ms and order_timeout_ms must be non-zero".to_string(),
            });
        }
        if exec.price_tick <= Decimal::ZERO || exec.size_step <= Decimal::ZERO {
            return Err(Error::Config {
                message: "price_tick and size_step must be positive".to_string(),
            });
        }
        if exec.fee_rate < Decimal::ZERO || exec.fee_rate >= Decimal::ONE {
            return Err(Error::Config {
                message: "fee_rate must be within [0, 1)".to_string(),
            });
        }
        let unit = |p: Decimal| p > Decimal::ZERO && p < Decimal::ONE;
        if !unit(exec.aggressive_buy_price)
            || !unit(exec.aggressive_sell_price)
            || exec.aggressive_sell_price >= exec.aggressive_buy_price
        {
            return Err(Error::Config {
                message: "aggressive prices must satisfy 0 < sell < buy < 1".to_string(),
            });
        }
        if exec.aggressive_timeout_ms == 0 {
            return Err(Error::Config {
                message: "aggressive_timeout_ms must be non-zero".to_string(),
            });
        }
        if self.risk.initial_equity <= Decimal::ZERO {
            return Err(Error::Config {
                message: "initial_equity must be positive".to_string(),
            });
        }
        if exec.mode == ExecutionMode::Live && !self.polymarket.has_credentials() {
            return Err(Error::Config {
                message: "live mode requires POLY_API_KEY, POLY_API_SECRET, POLY_API_PASSPHRASE, POLY_ADDRESS and POLY_PRIVATE_KEY".to_string(),
            });
        }
        Ok(())
    }

    /// Configuration for testing (paper mode, default limits).
    pub fn test_config() -> Self {
        Self::default()
    }
}
