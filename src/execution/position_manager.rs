use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::OrderVenue;
use crate::config::StrategyConfig;
use crate::error::TradingError;
use crate::execution::quantizer::quantize;
use crate::models::{OrderConfirmation, OrderRequest, PositionState, TradeRecord, TradeSide};
use crate::risk::RiskLimiter;

/// The single position we manage
///
/// Quantity, entry price and the trailing high only exist while long, so they
/// are always set and cleared together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
    Flat,
    Long {
        quantity: f64,
        entry_price: f64,
        highest_price: f64, // Track highest price for trailing stop
    },
}

impl Position {
    pub fn state(&self) -> PositionState {
        match self {
            Position::Flat => PositionState::Flat,
            Position::Long { .. } => PositionState::Long,
        }
    }

    pub fn quantity(&self) -> f64 {
        match self {
            Position::Flat => 0.0,
            Position::Long { quantity, .. } => *quantity,
        }
    }

    pub fn entry_price(&self) -> Option<f64> {
        match self {
            Position::Flat => None,
            Position::Long { entry_price, .. } => Some(*entry_price),
        }
    }

    pub fn highest_price(&self) -> Option<f64> {
        match self {
            Position::Flat => None,
            Position::Long { highest_price, .. } => Some(*highest_price),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    TakeProfit,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TrailingStop => "TRAILING_STOP",
            ExitReason::TakeProfit => "TAKE_PROFIT",
        }
    }
}

/// Result of one order attempt
#[derive(Debug)]
pub enum OrderOutcome {
    Filled { side: TradeSide, quantity: f64, price: f64 },
    /// Nothing was sent to the venue
    Skipped(String),
    Failed(TradingError),
}

impl OrderOutcome {
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderOutcome::Filled { .. })
    }
}

/// What a submitted order is meant to do once the venue confirms it
#[derive(Debug, Clone, Copy, PartialEq)]
enum OrderIntent {
    Entry,
    Exit(ExitReason),
}

/// Attempt whose outcome is unknown; resubmitted verbatim so the venue can dedupe
#[derive(Debug, Clone)]
struct PendingOrder {
    request: OrderRequest,
    intent: OrderIntent,
    /// Price observed when the order was first placed
    reference_price: f64,
}

pub struct PositionManager {
    symbol: String,
    config: StrategyConfig,
    venue: Arc<dyn OrderVenue>,
    position: Position,
    pending: Option<PendingOrder>,
    trade_log: Vec<TradeRecord>,
}

impl PositionManager {
    pub fn new(symbol: impl Into<String>, config: StrategyConfig, venue: Arc<dyn OrderVenue>) -> Self {
        Self {
            symbol: symbol.into(),
            config,
            venue,
            position: Position::Flat,
            pending: None,
            trade_log: Vec::new(),
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn state(&self) -> PositionState {
        self.position.state()
    }

    pub fn pending_order(&self) -> Option<&OrderRequest> {
        self.pending.as_ref().map(|p| &p.request)
    }

    pub fn trade_log(&self) -> &[TradeRecord] {
        &self.trade_log
    }

    /// Stop loss level while long
    pub fn stop_price(&self) -> Option<f64> {
        self.position
            .entry_price()
            .map(|entry| entry * (1.0 - self.config.stop_loss_fraction))
    }

    /// Unrealized P&L in percent while long
    pub fn unrealized_pnl_pct(&self, current_price: f64) -> Option<f64> {
        match self.position {
            Position::Long { entry_price, .. } if current_price > 0.0 => {
                Some((current_price - entry_price) / entry_price * 100.0)
            }
            _ => None,
        }
    }

    /// Resubmit an order left in an unknown state, whatever the current signal
    ///
    /// Runs before any new decision so a buy or sell that went through at the
    /// venue is reflected in the position. `None` when nothing is pending.
    pub async fn resolve_pending(&mut self, limiter: &mut RiskLimiter) -> Option<OrderOutcome> {
        let pending = self.pending.clone()?;
        tracing::warn!(
            client_order_id = %pending.request.client_order_id,
            side = pending.request.side.as_str(),
            "Resubmitting order with unknown status"
        );

        let requested = pending.request.quantity;
        let outcome = match self
            .submit(pending.request, pending.intent, pending.reference_price)
            .await
        {
            Ok(confirmation) => match pending.intent {
                OrderIntent::Entry => {
                    self.apply_entry(&confirmation, requested, pending.reference_price, limiter)
                }
                OrderIntent::Exit(reason) => {
                    self.apply_exit(&confirmation, requested, pending.reference_price, reason)
                }
            },
            Err(e) => {
                tracing::error!(symbol = %self.symbol, "✗ Pending order still unresolved: {}", e);
                OrderOutcome::Failed(e)
            }
        };
        Some(outcome)
    }

    /// Open a long position sized from `balance`
    pub async fn enter(&mut self, price: f64, balance: f64, limiter: &mut RiskLimiter) -> OrderOutcome {
        if self.position.state() == PositionState::Long {
            return OrderOutcome::Skipped("already long".to_string());
        }
        if let Some(pending) = &self.pending {
            return OrderOutcome::Skipped(format!(
                "{} order {} still unresolved",
                pending.request.side.as_str(),
                pending.request.client_order_id
            ));
        }
        if price <= 0.0 {
            return OrderOutcome::Skipped(format!("no valid price ({})", price));
        }
        if !limiter.can_open_new_trade() {
            return OrderOutcome::Skipped(format!(
                "daily trade limit reached ({}/{})",
                limiter.trades_today(),
                limiter.max_trades_per_day()
            ));
        }

        let request = match self.prepare_entry(price, balance).await {
            Ok(request) => request,
            Err(outcome) => return outcome,
        };

        let quantity = request.quantity;
        match self.submit(request, OrderIntent::Entry, price).await {
            Ok(confirmation) => self.apply_entry(&confirmation, quantity, price, limiter),
            Err(e) => {
                tracing::error!(symbol = %self.symbol, price, "✗ Buy failed: {}", e);
                OrderOutcome::Failed(e)
            }
        }
    }

    async fn prepare_entry(&self, price: f64, balance: f64) -> Result<OrderRequest, OrderOutcome> {
        let desired = balance * self.config.risk_fraction / price;
        if !(desired > 0.0) {
            return Err(OrderOutcome::Skipped(format!(
                "nothing to buy with balance {:.2}",
                balance
            )));
        }

        let constraints = self
            .venue
            .get_constraints(&self.symbol)
            .await
            .map_err(|e| {
                tracing::warn!(symbol = %self.symbol, "Cannot size entry: {}", e);
                OrderOutcome::Failed(e)
            })?;

        let quantity = quantize(desired, &constraints).map_err(|e| {
            tracing::warn!(symbol = %self.symbol, desired, "Entry quantity invalid: {}", e);
            OrderOutcome::Failed(e)
        })?;

        let notional = quantity * price;
        if notional < self.config.min_notional {
            return Err(OrderOutcome::Skipped(format!(
                "notional {:.2} below minimum {:.2}",
                notional, self.config.min_notional
            )));
        }

        Ok(self.new_request(TradeSide::Buy, quantity))
    }

    fn apply_entry(
        &mut self,
        confirmation: &OrderConfirmation,
        requested: f64,
        reference_price: f64,
        limiter: &mut RiskLimiter,
    ) -> OrderOutcome {
        if self.position.state() == PositionState::Long {
            return OrderOutcome::Skipped("buy confirmed while already long".to_string());
        }

        let quantity = filled_quantity(confirmation, requested);
        let price = fill_price(confirmation, reference_price);
        self.position = Position::Long {
            quantity,
            entry_price: price,
            highest_price: price,
        };
        limiter.record_trade();
        self.trade_log.push(TradeRecord {
            side: TradeSide::Buy,
            quantity,
            price,
            reason: None,
            realized_pnl: None,
            timestamp: Utc::now(),
        });

        tracing::info!(
            symbol = %self.symbol,
            quantity,
            price,
            trades_today = limiter.trades_today(),
            "🟢 BUY filled"
        );
        OrderOutcome::Filled {
            side: TradeSide::Buy,
            quantity,
            price,
        }
    }

    /// Raise the trailing high. No effect while flat.
    pub fn observe_price(&mut self, price: f64) {
        if let Position::Long { highest_price, .. } = &mut self.position {
            if price > *highest_price {
                *highest_price = price;
            }
        }
    }

    /// Which exit rule fires at `price`, first match wins
    pub fn exit_reason(&self, price: f64) -> Option<ExitReason> {
        let Position::Long {
            entry_price,
            highest_price,
            ..
        } = self.position
        else {
            return None;
        };

        if price <= entry_price * (1.0 - self.config.stop_loss_fraction) {
            return Some(ExitReason::StopLoss);
        }
        if price <= highest_price * (1.0 - self.config.trailing_stop_fraction) {
            return Some(ExitReason::TrailingStop);
        }
        if price >= entry_price * (1.0 + self.config.take_profit_fraction) {
            return Some(ExitReason::TakeProfit);
        }
        None
    }

    /// Close the position if an exit rule fires
    ///
    /// Not gated by the trade cap or the daily circuit breaker.
    pub async fn evaluate_exit(&mut self, price: f64) -> Option<(ExitReason, OrderOutcome)> {
        if price <= 0.0 {
            tracing::debug!(price, "Skipping exit evaluation without a valid price");
            return None;
        }

        let reason = self.exit_reason(price)?;
        let Position::Long {
            quantity,
            entry_price,
            ..
        } = self.position
        else {
            return None;
        };

        if let Some(pending) = &self.pending {
            let outcome = OrderOutcome::Skipped(format!(
                "{} order {} still unresolved",
                pending.request.side.as_str(),
                pending.request.client_order_id
            ));
            return Some((reason, outcome));
        }

        tracing::info!(
            symbol = %self.symbol,
            price,
            entry_price,
            reason = reason.as_str(),
            "Exit condition met"
        );

        let request = match self.prepare_exit(quantity).await {
            Ok(request) => request,
            Err(outcome) => return Some((reason, outcome)),
        };

        let requested = request.quantity;
        let outcome = match self.submit(request, OrderIntent::Exit(reason), price).await {
            Ok(confirmation) => self.apply_exit(&confirmation, requested, price, reason),
            Err(e) => {
                tracing::error!(
                    symbol = %self.symbol,
                    reason = reason.as_str(),
                    "✗ Sell failed, position stays open: {}",
                    e
                );
                OrderOutcome::Failed(e)
            }
        };

        Some((reason, outcome))
    }

    async fn prepare_exit(&self, quantity: f64) -> Result<OrderRequest, OrderOutcome> {
        let constraints = self
            .venue
            .get_constraints(&self.symbol)
            .await
            .map_err(|e| {
                tracing::warn!(symbol = %self.symbol, "Cannot size exit: {}", e);
                OrderOutcome::Failed(e)
            })?;

        let quantity = quantize(quantity, &constraints).map_err(|e| {
            tracing::warn!(symbol = %self.symbol, quantity, "Exit quantity invalid: {}", e);
            OrderOutcome::Failed(e)
        })?;

        Ok(self.new_request(TradeSide::Sell, quantity))
    }

    fn apply_exit(
        &mut self,
        confirmation: &OrderConfirmation,
        requested: f64,
        reference_price: f64,
        reason: ExitReason,
    ) -> OrderOutcome {
        let Position::Long { entry_price, .. } = self.position else {
            return OrderOutcome::Skipped("sell confirmed while flat".to_string());
        };

        let sold = filled_quantity(confirmation, requested);
        let price = fill_price(confirmation, reference_price);
        let realized_pnl = (price - entry_price) * sold;
        self.position = Position::Flat;
        self.trade_log.push(TradeRecord {
            side: TradeSide::Sell,
            quantity: sold,
            price,
            reason: Some(reason.as_str().to_string()),
            realized_pnl: Some(realized_pnl),
            timestamp: Utc::now(),
        });

        tracing::info!(
            symbol = %self.symbol,
            quantity = sold,
            price,
            realized_pnl,
            reason = reason.as_str(),
            "🔴 SELL filled"
        );
        OrderOutcome::Filled {
            side: TradeSide::Sell,
            quantity: sold,
            price,
        }
    }

    fn new_request(&self, side: TradeSide, quantity: f64) -> OrderRequest {
        OrderRequest {
            client_order_id: Uuid::new_v4(),
            symbol: self.symbol.clone(),
            side,
            quantity,
        }
    }

    /// Submit and track the attempt until its outcome is definite
    async fn submit(
        &mut self,
        request: OrderRequest,
        intent: OrderIntent,
        reference_price: f64,
    ) -> crate::Result<OrderConfirmation> {
        let result = self.venue.submit_market_order(&request).await;
        match &result {
            Err(e) if e.is_ambiguous() => {
                tracing::warn!(
                    client_order_id = %request.client_order_id,
                    "Order outcome unknown, will resubmit with the same client id"
                );
                self.pending = Some(PendingOrder {
                    request,
                    intent,
                    reference_price,
                });
            }
            _ => self.pending = None,
        }

        result
    }
}

fn filled_quantity(confirmation: &OrderConfirmation, requested: f64) -> f64 {
    if confirmation.executed_quantity > 0.0 {
        confirmation.executed_quantity
    } else {
        requested
    }
}

/// Venue-reported average price, else the price the decision was made at
fn fill_price(confirmation: &OrderConfirmation, reference_price: f64) -> f64 {
    match confirmation.fill_price {
        Some(price) if price > 0.0 && price.is_finite() => price,
        _ => reference_price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VenueConstraints;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Fill,
        FillAt(f64),
        Reject,
        Unknown,
    }

    /// Venue that replays scripted replies and records every submission
    struct ScriptedVenue {
        constraints: Option<VenueConstraints>,
        replies: Mutex<VecDeque<Reply>>,
        submitted: Mutex<Vec<OrderRequest>>,
    }

    impl ScriptedVenue {
        fn new(replies: &[Reply]) -> Arc<Self> {
            Arc::new(Self {
                constraints: Some(VenueConstraints {
                    min_quantity: 0.001,
                    max_quantity: 1000.0,
                    step_size: 0.001,
                }),
                replies: Mutex::new(replies.iter().copied().collect()),
                submitted: Mutex::new(Vec::new()),
            })
        }

        fn without_constraints() -> Arc<Self> {
            Arc::new(Self {
                constraints: None,
                replies: Mutex::new(VecDeque::new()),
                submitted: Mutex::new(Vec::new()),
            })
        }

        fn submitted(&self) -> Vec<OrderRequest> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OrderVenue for ScriptedVenue {
        async fn get_constraints(&self, symbol: &str) -> crate::Result<VenueConstraints> {
            self.constraints
                .ok_or_else(|| TradingError::ConstraintsUnavailable {
                    symbol: symbol.to_string(),
                    reason: "offline".to_string(),
                })
        }

        async fn submit_market_order(&self, request: &OrderRequest) -> crate::Result<OrderConfirmation> {
            self.submitted.lock().unwrap().push(request.clone());
            let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Fill);
            match reply {
                Reply::Fill => Ok(OrderConfirmation {
                    client_order_id: request.client_order_id,
                    executed_quantity: request.quantity,
                    fill_price: None,
                }),
                Reply::FillAt(price) => Ok(OrderConfirmation {
                    client_order_id: request.client_order_id,
                    executed_quantity: request.quantity,
                    fill_price: Some(price),
                }),
                Reply::Reject => Err(TradingError::OrderRejected("insufficient funds".to_string())),
                Reply::Unknown => Err(TradingError::OrderStatusUnknown {
                    client_order_id: request.client_order_id,
                    reason: "timeout".to_string(),
                }),
            }
        }
    }

    fn config() -> StrategyConfig {
        StrategyConfig {
            risk_fraction: 0.5,
            stop_loss_fraction: 0.02,
            trailing_stop_fraction: 0.015,
            take_profit_fraction: 0.03,
            min_notional: 10.0,
            max_trades_per_day: 5,
            ..Default::default()
        }
    }

    fn limiter(max_trades: u32) -> RiskLimiter {
        RiskLimiter::new(-0.05, max_trades, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    }

    fn manager(venue: Arc<ScriptedVenue>) -> PositionManager {
        PositionManager::new("SOLBRL", config(), venue)
    }

    /// Manager already long 5 @ 100
    async fn long_at_100(venue: Arc<ScriptedVenue>) -> PositionManager {
        let mut pm = manager(venue);
        let outcome = pm.enter(100.0, 1000.0, &mut limiter(5)).await;
        assert!(outcome.is_filled());
        pm
    }

    #[tokio::test]
    async fn test_enter_sizes_from_balance() {
        let venue = ScriptedVenue::new(&[]);
        let mut pm = manager(venue.clone());
        let mut limiter = limiter(5);

        // 1000 * 0.5 / 30 = 16.6666.. floored to 16.666
        let outcome = pm.enter(30.0, 1000.0, &mut limiter).await;

        assert!(outcome.is_filled());
        assert_eq!(
            pm.position(),
            Position::Long {
                quantity: 16.666,
                entry_price: 30.0,
                highest_price: 30.0,
            }
        );
        assert_eq!(limiter.trades_today(), 1);
        assert_eq!(venue.submitted().len(), 1);
        assert_eq!(venue.submitted()[0].side, TradeSide::Buy);
        assert!(pm.pending_order().is_none());
    }

    #[tokio::test]
    async fn test_enter_blocked_at_trade_cap() {
        let venue = ScriptedVenue::new(&[]);
        let mut pm = manager(venue.clone());
        let mut limiter = limiter(1);
        limiter.record_trade();

        let outcome = pm.enter(100.0, 1000.0, &mut limiter).await;

        assert!(matches!(outcome, OrderOutcome::Skipped(_)));
        assert!(venue.submitted().is_empty());
        assert_eq!(pm.state(), PositionState::Flat);
    }

    #[tokio::test]
    async fn test_enter_requires_positive_price() {
        let venue = ScriptedVenue::new(&[]);
        let mut pm = manager(venue.clone());

        let outcome = pm.enter(0.0, 1000.0, &mut limiter(5)).await;

        assert!(matches!(outcome, OrderOutcome::Skipped(_)));
        assert!(venue.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_enter_below_min_notional_skipped() {
        let venue = ScriptedVenue::new(&[]);
        let mut pm = manager(venue.clone());

        // 15 * 0.5 = 7.5 notional < 10
        let outcome = pm.enter(100.0, 15.0, &mut limiter(5)).await;

        assert!(matches!(outcome, OrderOutcome::Skipped(ref r) if r.contains("notional")));
        assert!(venue.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_enter_without_constraints_fails_flat() {
        let venue = ScriptedVenue::without_constraints();
        let mut pm = manager(venue.clone());
        let mut limiter = limiter(5);

        let outcome = pm.enter(100.0, 1000.0, &mut limiter).await;

        assert!(matches!(
            outcome,
            OrderOutcome::Failed(TradingError::ConstraintsUnavailable { .. })
        ));
        assert_eq!(pm.state(), PositionState::Flat);
        assert_eq!(limiter.trades_today(), 0);
    }

    #[tokio::test]
    async fn test_rejected_buy_stays_flat() {
        let venue = ScriptedVenue::new(&[Reply::Reject]);
        let mut pm = manager(venue.clone());
        let mut limiter = limiter(5);

        let outcome = pm.enter(100.0, 1000.0, &mut limiter).await;

        assert!(matches!(outcome, OrderOutcome::Failed(TradingError::OrderRejected(_))));
        assert_eq!(pm.position(), Position::Flat);
        assert_eq!(pm.position().quantity(), 0.0);
        assert_eq!(limiter.trades_today(), 0);
        assert!(pm.pending_order().is_none());
    }

    #[tokio::test]
    async fn test_unknown_buy_is_resolved_with_same_id() {
        let venue = ScriptedVenue::new(&[Reply::Unknown, Reply::Fill]);
        let mut pm = manager(venue.clone());
        let mut limiter = limiter(5);

        let first = pm.enter(100.0, 1000.0, &mut limiter).await;
        assert!(matches!(first, OrderOutcome::Failed(_)));
        assert_eq!(pm.state(), PositionState::Flat);
        assert!(pm.pending_order().is_some());

        // A new entry never starts while the first one is unresolved
        let blocked = pm.enter(101.0, 990.0, &mut limiter).await;
        assert!(matches!(blocked, OrderOutcome::Skipped(_)));
        assert_eq!(venue.submitted().len(), 1);

        let resolved = pm.resolve_pending(&mut limiter).await.unwrap();
        assert!(resolved.is_filled());
        assert_eq!(pm.position().entry_price(), Some(100.0));

        let submitted = venue.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0], submitted[1]);
        assert_eq!(limiter.trades_today(), 1);
        assert!(pm.pending_order().is_none());
        assert!(pm.resolve_pending(&mut limiter).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_again_keeps_order_pending() {
        let venue = ScriptedVenue::new(&[Reply::Unknown, Reply::Unknown, Reply::Reject]);
        let mut pm = manager(venue.clone());
        let mut limiter = limiter(5);

        pm.enter(100.0, 1000.0, &mut limiter).await;
        let again = pm.resolve_pending(&mut limiter).await.unwrap();
        assert!(matches!(again, OrderOutcome::Failed(TradingError::OrderStatusUnknown { .. })));
        assert!(pm.pending_order().is_some());

        // A definitive answer clears it
        let rejected = pm.resolve_pending(&mut limiter).await.unwrap();
        assert!(matches!(rejected, OrderOutcome::Failed(TradingError::OrderRejected(_))));
        assert!(pm.pending_order().is_none());
        assert_eq!(pm.state(), PositionState::Flat);
        assert_eq!(limiter.trades_today(), 0);
    }

    #[tokio::test]
    async fn test_unknown_sell_resolved_after_price_recovers() {
        let venue = ScriptedVenue::new(&[Reply::Fill, Reply::Unknown, Reply::Fill]);
        let mut pm = long_at_100(venue.clone()).await;
        let mut limiter = limiter(5);

        let (_, outcome) = pm.evaluate_exit(97.0).await.unwrap();
        assert!(matches!(outcome, OrderOutcome::Failed(_)));
        assert_eq!(pm.state(), PositionState::Long);

        // Price is back above every stop, the pending sell still settles
        assert!(pm.exit_reason(101.0).is_none());
        let resolved = pm.resolve_pending(&mut limiter).await.unwrap();
        assert!(resolved.is_filled());
        assert_eq!(pm.position(), Position::Flat);

        let submitted = venue.submitted();
        assert_eq!(submitted[1], submitted[2]);
        let record = pm.trade_log().last().unwrap();
        assert_eq!(record.reason.as_deref(), Some("STOP_LOSS"));
        assert_eq!(record.realized_pnl, Some(-15.0));
    }

    #[tokio::test]
    async fn test_entry_uses_reported_fill_price() {
        let venue = ScriptedVenue::new(&[Reply::FillAt(101.0)]);
        let mut pm = manager(venue);

        let outcome = pm.enter(100.0, 1000.0, &mut limiter(5)).await;

        assert!(outcome.is_filled());
        assert_eq!(pm.position().entry_price(), Some(101.0));
        assert_eq!(pm.position().highest_price(), Some(101.0));
        assert_eq!(pm.trade_log()[0].price, 101.0);
    }

    #[tokio::test]
    async fn test_exit_precedence() {
        let venue = ScriptedVenue::new(&[]);
        let mut pm = long_at_100(venue).await;
        pm.observe_price(110.0);

        // Trailing threshold 108.35 is also breached, stop loss wins
        assert_eq!(pm.exit_reason(97.0), Some(ExitReason::StopLoss));
        assert_eq!(pm.exit_reason(98.0), Some(ExitReason::StopLoss));
        assert_eq!(pm.exit_reason(108.0), Some(ExitReason::TrailingStop));
        assert_eq!(pm.exit_reason(108.35), Some(ExitReason::TrailingStop));
        assert_eq!(pm.exit_reason(109.0), Some(ExitReason::TakeProfit));
    }

    #[tokio::test]
    async fn test_take_profit_and_no_exit_without_new_high() {
        let venue = ScriptedVenue::new(&[]);
        let pm = long_at_100(venue).await;

        assert_eq!(pm.exit_reason(103.0), Some(ExitReason::TakeProfit));
        assert_eq!(pm.exit_reason(101.0), None);
        assert_eq!(pm.exit_reason(98.6), None);
        // 98.5 is the trailing threshold off the entry
        assert_eq!(pm.exit_reason(98.5), Some(ExitReason::TrailingStop));
    }

    #[tokio::test]
    async fn test_stop_loss_round_trip_to_flat() {
        let venue = ScriptedVenue::new(&[]);
        let mut pm = long_at_100(venue.clone()).await;

        let (reason, outcome) = pm.evaluate_exit(97.0).await.unwrap();

        assert_eq!(reason, ExitReason::StopLoss);
        assert!(outcome.is_filled());
        assert_eq!(pm.position(), Position::Flat);
        assert_eq!(pm.position().quantity(), 0.0);
        assert!(pm.position().entry_price().is_none());
        assert!(pm.stop_price().is_none());

        let sell = venue.submitted().pop().unwrap();
        assert_eq!(sell.side, TradeSide::Sell);
        assert_eq!(sell.quantity, 5.0);

        let record = pm.trade_log().last().unwrap();
        assert_eq!(record.realized_pnl, Some(-15.0));
        assert_eq!(record.reason.as_deref(), Some("STOP_LOSS"));
    }

    #[tokio::test]
    async fn test_exit_not_gated_by_trade_cap() {
        let venue = ScriptedVenue::new(&[]);
        let mut pm = manager(venue.clone());
        let mut limiter = limiter(1);

        assert!(pm.enter(100.0, 1000.0, &mut limiter).await.is_filled());
        assert!(!limiter.can_open_new_trade());

        let (_, outcome) = pm.evaluate_exit(103.0).await.unwrap();
        assert!(outcome.is_filled());
        assert_eq!(pm.state(), PositionState::Flat);
        // Exits are not counted
        assert_eq!(limiter.trades_today(), 1);
    }

    #[tokio::test]
    async fn test_failed_exit_stays_long_and_retries() {
        let venue = ScriptedVenue::new(&[Reply::Fill, Reply::Reject, Reply::Fill]);
        let mut pm = long_at_100(venue.clone()).await;
        let before = pm.position();

        let (_, outcome) = pm.evaluate_exit(97.0).await.unwrap();
        assert!(matches!(outcome, OrderOutcome::Failed(_)));
        assert_eq!(pm.position(), before);

        let (_, outcome) = pm.evaluate_exit(97.0).await.unwrap();
        assert!(outcome.is_filled());
        assert_eq!(pm.position(), Position::Flat);
    }

    #[tokio::test]
    async fn test_no_exit_evaluation_without_price() {
        let venue = ScriptedVenue::new(&[]);
        let mut pm = long_at_100(venue.clone()).await;

        assert!(pm.evaluate_exit(0.0).await.is_none());
        assert_eq!(pm.state(), PositionState::Long);
        assert_eq!(venue.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_no_exit_when_flat() {
        let venue = ScriptedVenue::new(&[]);
        let mut pm = manager(venue);
        assert!(pm.evaluate_exit(50.0).await.is_none());
    }

    #[test]
    fn test_observe_price_only_raises_high() {
        let venue = ScriptedVenue::new(&[]);
        let mut pm = tokio_test::block_on(long_at_100(venue));

        pm.observe_price(105.0);
        assert_eq!(pm.position().highest_price(), Some(105.0));

        pm.observe_price(104.0);
        pm.observe_price(105.0);
        assert_eq!(pm.position().highest_price(), Some(105.0));
    }

    #[test]
    fn test_observe_price_while_flat_is_noop() {
        let venue = ScriptedVenue::new(&[]);
        let mut pm = manager(venue);
        pm.observe_price(500.0);
        assert_eq!(pm.position(), Position::Flat);
        assert!(pm.position().highest_price().is_none());
    }

    #[test]
    fn test_stop_price_and_unrealized_pnl() {
        let venue = ScriptedVenue::new(&[]);
        let pm = tokio_test::block_on(long_at_100(venue));

        assert_eq!(pm.stop_price(), Some(98.0));
        assert_eq!(pm.unrealized_pnl_pct(110.0), Some(10.0));
        assert_eq!(pm.unrealized_pnl_pct(0.0), None);
    }
}
