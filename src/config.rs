//! Bot configuration
//!
//! Loaded once at startup from an optional TOML file layered under
//! `TRENDBOT_*` environment variables, then frozen for the process lifetime.

use crate::error::TradingError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "TRENDBOT";

/// Strategy and risk parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    /// Candle interval requested from the data source (e.g. "5m")
    pub timeframe: String,
    pub history_window_length: usize,
    /// Fraction of the quote balance committed per entry
    pub risk_fraction: f64,
    pub stop_loss_fraction: f64,
    pub trailing_stop_fraction: f64,
    pub take_profit_fraction: f64,
    /// Latest volume must exceed average volume times this factor
    pub min_volume_factor: f64,
    /// Negative fraction, e.g. -0.05 for a 5% daily loss cutoff
    pub daily_loss_limit_fraction: f64,
    pub max_trades_per_day: u32,
    pub poll_interval_seconds: u64,
    pub error_backoff_seconds: u64,
    pub recovery_backoff_seconds: u64,
    /// Smallest order notional (quantity x price) worth submitting
    pub min_notional: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            timeframe: "5m".to_string(),
            history_window_length: 12,
            risk_fraction: 0.5,
            stop_loss_fraction: 0.02,
            trailing_stop_fraction: 0.015,
            take_profit_fraction: 0.03,
            min_volume_factor: 1.5,
            daily_loss_limit_fraction: -0.05,
            max_trades_per_day: 5,
            poll_interval_seconds: 60,
            error_backoff_seconds: 10,
            recovery_backoff_seconds: 30,
            min_notional: 10.0,
        }
    }
}

impl StrategyConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_seconds)
    }

    pub fn recovery_backoff(&self) -> Duration {
        Duration::from_secs(self.recovery_backoff_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        let unit_fractions = [
            ("risk_fraction", self.risk_fraction),
            ("stop_loss_fraction", self.stop_loss_fraction),
            ("trailing_stop_fraction", self.trailing_stop_fraction),
        ];
        for (name, value) in unit_fractions {
            if !(value > 0.0 && value <= 1.0) {
                return Err(TradingError::Configuration(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }

        if !(self.take_profit_fraction > 0.0) {
            return Err(TradingError::Configuration(format!(
                "take_profit_fraction must be positive, got {}",
                self.take_profit_fraction
            )));
        }
        if !(self.daily_loss_limit_fraction < 0.0 && self.daily_loss_limit_fraction > -1.0) {
            return Err(TradingError::Configuration(format!(
                "daily_loss_limit_fraction must be in (-1, 0), got {}",
                self.daily_loss_limit_fraction
            )));
        }
        if self.min_volume_factor < 0.0 || self.min_notional < 0.0 {
            return Err(TradingError::Configuration(
                "min_volume_factor and min_notional must not be negative".to_string(),
            ));
        }
        if self.history_window_length < 2 {
            return Err(TradingError::Configuration(format!(
                "history_window_length must be at least 2, got {}",
                self.history_window_length
            )));
        }
        if self.max_trades_per_day == 0 {
            return Err(TradingError::Configuration(
                "max_trades_per_day must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_seconds == 0 {
            return Err(TradingError::Configuration(
                "poll_interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.timeframe.trim().is_empty() {
            return Err(TradingError::Configuration(
                "timeframe must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Everything the binary needs to assemble an engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotConfig {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub history_file: PathBuf,
    pub binance_base_url: String,
    /// Starting quote balance of the paper account
    pub paper_quote_balance: f64,
    pub strategy: StrategyConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbol: "SOLBRL".to_string(),
            base_asset: "SOL".to_string(),
            quote_asset: "BRL".to_string(),
            history_file: PathBuf::from("prices.txt"),
            binance_base_url: "https://api.binance.com".to_string(),
            paper_quote_balance: 1000.0,
            strategy: StrategyConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load from `path` (optional) and the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| TradingError::Configuration(e.to_string()))?;

        let loaded: BotConfig = settings
            .try_deserialize()
            .map_err(|e| TradingError::Configuration(e.to_string()))?;

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(TradingError::Configuration(
                "symbol must not be empty".to_string(),
            ));
        }
        if self.quote_asset.trim().is_empty() || self.base_asset.trim().is_empty() {
            return Err(TradingError::Configuration(
                "base_asset and quote_asset must not be empty".to_string(),
            ));
        }
        if self.paper_quote_balance < 0.0 {
            return Err(TradingError::Configuration(format!(
                "paper_quote_balance must not be negative, got {}",
                self.paper_quote_balance
            )));
        }
        self.strategy.validate()
    }
}
