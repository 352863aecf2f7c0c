use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{PositionState, Signal, TradeRecord};
use crate::risk::RiskLevel;

/// Read-only view of the engine for dashboards and status logs
///
/// Published as a whole after every iteration, so paired fields such as
/// quantity and entry price always come from the same moment.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub symbol: String,
    pub current_price: f64,
    /// Free quote balance
    pub balance: f64,
    /// Quote balance plus the position marked at the current price
    pub equity: Option<f64>,
    pub position_state: PositionState,
    pub quantity: f64,
    pub entry_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub unrealized_pnl_pct: Option<f64>,
    pub trades_today: u32,
    pub risk_level: RiskLevel,
    pub daily_pnl_fraction: f64,
    pub signal: Signal,
    pub latest_volume: f64,
    pub running: bool,
    pub halted: bool,
    pub price_history: Vec<f64>,
    pub trade_log: Vec<TradeRecord>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EngineSnapshot {
    pub fn empty(symbol: impl Into<String>, price_history: Vec<f64>) -> Self {
        Self {
            symbol: symbol.into(),
            current_price: 0.0,
            balance: 0.0,
            equity: None,
            position_state: PositionState::Flat,
            quantity: 0.0,
            entry_price: None,
            stop_price: None,
            unrealized_pnl_pct: None,
            trades_today: 0,
            risk_level: RiskLevel::Low,
            daily_pnl_fraction: 0.0,
            signal: Signal::Hold,
            latest_volume: 0.0,
            running: false,
            halted: false,
            price_history,
            trade_log: Vec::new(),
            updated_at: None,
        }
    }
}
