use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-day risk bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub trading_day: NaiveDate,
    pub trades_executed_today: u32,
    pub day_start_balance: f64,
}

impl RiskState {
    pub fn new(trading_day: NaiveDate) -> Self {
        Self {
            trading_day,
            trades_executed_today: 0,
            day_start_balance: 0.0,
        }
    }
}

/// Display banding off today's trade count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_trade_count(trades: u32) -> Self {
        match trades {
            0 => RiskLevel::Low,
            1..=2 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

/// Daily loss circuit breaker and trade-count cap
#[derive(Debug, Clone)]
pub struct RiskLimiter {
    daily_loss_limit_fraction: f64, // e.g. -0.05 for -5% daily
    max_trades_per_day: u32,
    state: RiskState,
}

impl RiskLimiter {
    pub fn new(daily_loss_limit_fraction: f64, max_trades_per_day: u32, today: NaiveDate) -> Self {
        Self {
            daily_loss_limit_fraction,
            max_trades_per_day,
            state: RiskState::new(today),
        }
    }

    /// Start a new trading day when the date changes
    pub fn check_and_roll(&mut self, current_date: NaiveDate, current_balance: f64) {
        self.roll_date(current_date);

        // First run, a roll without a known balance, or zero balance: avoid dividing by zero
        if self.state.day_start_balance == 0.0 {
            self.state.day_start_balance = current_balance;
        }
    }

    /// Reset the daily counters on a date change, leaving the start balance unseeded
    ///
    /// Returns true when the day rolled.
    pub fn roll_date(&mut self, current_date: NaiveDate) -> bool {
        if current_date == self.state.trading_day {
            return false;
        }

        tracing::info!(
            previous_day = %self.state.trading_day,
            new_day = %current_date,
            trades = self.state.trades_executed_today,
            "New trading day, resetting daily risk counters"
        );
        self.state.trading_day = current_date;
        self.state.trades_executed_today = 0;
        self.state.day_start_balance = 0.0;
        true
    }

    pub fn daily_pnl_fraction(&self, current_balance: f64) -> f64 {
        let start = self.state.day_start_balance;
        if start == 0.0 {
            return 0.0;
        }
        (current_balance - start) / start
    }

    /// True once today's loss reaches the configured limit
    pub fn trip_wire(&self, current_balance: f64) -> bool {
        self.daily_pnl_fraction(current_balance) <= self.daily_loss_limit_fraction
    }

    pub fn can_open_new_trade(&self) -> bool {
        self.state.trades_executed_today < self.max_trades_per_day
    }

    /// Count a completed entry. Exits are not counted.
    pub fn record_trade(&mut self) {
        self.state.trades_executed_today += 1;
    }

    pub fn trades_today(&self) -> u32 {
        self.state.trades_executed_today
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_trade_count(self.state.trades_executed_today)
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn max_trades_per_day(&self) -> u32 {
        self.max_trades_per_day
    }
}
