use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use super::EngineSnapshot;
use crate::api::{MarketDataSource, OrderVenue};
use crate::config::StrategyConfig;
use crate::execution::{OrderOutcome, PositionManager, PriceWindow};
use crate::models::{PositionState, Signal};
use crate::risk::RiskLimiter;
use crate::strategy::{Strategy, TrendVolumeStrategy};

/// What a single pass of the control loop ended with
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IterationOutcome {
    /// Full pass; carries the signal that was dispatched
    Completed(Signal),
    /// Candle window could not be fetched; nothing was evaluated
    DataUnavailable,
    /// Daily loss limit reached; the loop must stop for good
    Halted { daily_pnl_fraction: f64 },
}

/// Engine state mutated only by the control task
pub(crate) struct EngineCore {
    symbol: String,
    quote_asset: String,
    config: StrategyConfig,
    market: Arc<dyn MarketDataSource>,
    strategy: Box<dyn Strategy>,
    positions: PositionManager,
    limiter: RiskLimiter,
    window: PriceWindow,
    price_history: Vec<f64>,
    current_price: f64,
    balance: f64,
    equity: Option<f64>,
    signal: Signal,
    latest_volume: f64,
}

impl EngineCore {
    pub(crate) fn new(
        symbol: String,
        quote_asset: String,
        config: StrategyConfig,
        market: Arc<dyn MarketDataSource>,
        venue: Arc<dyn OrderVenue>,
        price_history: Vec<f64>,
        today: NaiveDate,
    ) -> Self {
        let positions = PositionManager::new(symbol.clone(), config.clone(), venue);
        let limiter = RiskLimiter::new(
            config.daily_loss_limit_fraction,
            config.max_trades_per_day,
            today,
        );
        let strategy = Box::new(TrendVolumeStrategy::new(config.min_volume_factor));
        let window = PriceWindow::new(config.history_window_length);

        Self {
            symbol,
            quote_asset,
            config,
            market,
            strategy,
            positions,
            limiter,
            window,
            price_history,
            current_price: 0.0,
            balance: 0.0,
            equity: None,
            signal: Signal::Hold,
            latest_volume: 0.0,
        }
    }

    pub(crate) fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// One pass: pending order, risk check, data, signal, dispatch
    pub(crate) async fn run_iteration(&mut self, today: NaiveDate) -> IterationOutcome {
        // 0. Settle any order left in an unknown state, whatever the signal
        if let Some(outcome) = self.positions.resolve_pending(&mut self.limiter).await {
            if outcome.is_filled() {
                tracing::info!(symbol = %self.symbol, "Pending order settled");
            }
        }

        // 1. Account state and the daily circuit breaker
        let balance = match self.market.get_balance(&self.quote_asset).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                tracing::warn!(asset = %self.quote_asset, "Balance unavailable: {}", e);
                None
            }
        };
        let price = self.fetch_price().await;

        self.balance = balance.unwrap_or(0.0);
        self.current_price = price;
        self.equity = self.mark_to_market(balance, price);

        match self.equity {
            Some(equity) => {
                self.limiter.check_and_roll(today, equity);
                if self.limiter.trip_wire(equity) {
                    let daily_pnl_fraction = self.limiter.daily_pnl_fraction(equity);
                    tracing::error!(
                        symbol = %self.symbol,
                        equity,
                        daily_pnl_pct = daily_pnl_fraction * 100.0,
                        limit_pct = self.config.daily_loss_limit_fraction * 100.0,
                        "🛑 Daily loss limit reached, halting trading"
                    );
                    if self.positions.state() == PositionState::Long {
                        tracing::warn!(
                            symbol = %self.symbol,
                            quantity = self.positions.position().quantity(),
                            "Halting with an open position"
                        );
                    }
                    return IterationOutcome::Halted { daily_pnl_fraction };
                }
            }
            None => {
                // The day still turns over; its start balance is seeded once equity is known
                self.limiter.roll_date(today);
                tracing::warn!(symbol = %self.symbol, "Account value unknown, skipping daily risk check");
            }
        }

        // 2. Candle window
        let samples = match self
            .market
            .get_recent_candles(
                &self.symbol,
                &self.config.timeframe,
                self.config.history_window_length,
            )
            .await
        {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(symbol = %self.symbol, "Candle fetch failed: {}", e);
                return IterationOutcome::DataUnavailable;
            }
        };
        self.window.replace(samples);
        self.price_history = self.window.closes();

        // 3. Indicators and signal
        let evaluation = self
            .strategy
            .evaluate(self.window.samples(), self.positions.state());
        self.signal = evaluation.signal;
        self.latest_volume = evaluation.latest_volume;

        tracing::debug!(
            strategy = self.strategy.name(),
            short_ma = evaluation.indicators.short_ma,
            long_ma = evaluation.indicators.long_ma,
            avg_volume = evaluation.indicators.avg_volume,
            latest_volume = evaluation.latest_volume,
            signal = ?evaluation.signal,
            "Evaluated window"
        );

        // 4. Trailing high
        self.positions.observe_price(price);

        // 5. Dispatch
        match evaluation.signal {
            Signal::Enter => {
                let outcome = self
                    .positions
                    .enter(price, self.balance, &mut self.limiter)
                    .await;
                if let OrderOutcome::Skipped(reason) = &outcome {
                    tracing::info!(symbol = %self.symbol, price, "Entry skipped: {}", reason);
                }
            }
            Signal::EvaluateExit => {
                if let Some((reason, outcome)) = self.positions.evaluate_exit(price).await {
                    if !outcome.is_filled() {
                        tracing::warn!(
                            symbol = %self.symbol,
                            reason = reason.as_str(),
                            "Exit not completed, retrying next cycle"
                        );
                    }
                }
            }
            Signal::Hold => {}
        }

        IterationOutcome::Completed(evaluation.signal)
    }

    async fn fetch_price(&self) -> f64 {
        match self.market.get_latest_price(&self.symbol).await {
            Ok(price) if price.is_finite() => price,
            Ok(price) => {
                tracing::warn!(symbol = %self.symbol, price, "Ignoring non-finite ticker price");
                0.0
            }
            Err(e) => {
                tracing::warn!(symbol = %self.symbol, "Ticker unavailable: {}", e);
                0.0
            }
        }
    }

    /// Quote balance plus the open position at `price`, when both are known
    fn mark_to_market(&self, balance: Option<f64>, price: f64) -> Option<f64> {
        let balance = balance?;
        match self.positions.state() {
            PositionState::Flat => Some(balance),
            PositionState::Long if price > 0.0 => {
                Some(balance + self.positions.position().quantity() * price)
            }
            PositionState::Long => None,
        }
    }

    pub(crate) fn snapshot(&self, running: bool, halted: bool) -> EngineSnapshot {
        let position = self.positions.position();
        let daily_pnl_fraction = self
            .equity
            .map(|equity| self.limiter.daily_pnl_fraction(equity))
            .unwrap_or(0.0);

        EngineSnapshot {
            symbol: self.symbol.clone(),
            current_price: self.current_price,
            balance: self.balance,
            equity: self.equity,
            position_state: position.state(),
            quantity: position.quantity(),
            entry_price: position.entry_price(),
            stop_price: self.positions.stop_price(),
            unrealized_pnl_pct: self.positions.unrealized_pnl_pct(self.current_price),
            trades_today: self.limiter.trades_today(),
            risk_level: self.limiter.risk_level(),
            daily_pnl_fraction,
            signal: self.signal,
            latest_volume: self.latest_volume,
            running,
            halted,
            price_history: self.price_history.clone(),
            trade_log: self.positions.trade_log().to_vec(),
            updated_at: Some(Utc::now()),
        }
    }
}
