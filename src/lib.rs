// Core modules
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use api::{MarketDataSource, OrderVenue};
pub use crate::config::{BotConfig, StrategyConfig};
pub use engine::{Engine, EngineSnapshot};
pub use error::TradingError;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, TradingError>;
