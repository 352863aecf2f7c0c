pub mod binance;
pub mod paper;

pub use binance::BinanceClient;
pub use paper::PaperExchange;

use crate::models::{OrderConfirmation, OrderRequest, PriceSample, VenueConstraints};
use crate::Result;
use async_trait::async_trait;

/// Source of candles, ticker prices and account balances
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Most recent `count` candles, newest last
    async fn get_recent_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<Vec<PriceSample>>;

    async fn get_latest_price(&self, symbol: &str) -> Result<f64>;

    /// Free balance of `asset`
    async fn get_balance(&self, asset: &str) -> Result<f64>;
}

/// Where market orders go
#[async_trait]
pub trait OrderVenue: Send + Sync {
    /// Lot size rules, fetched fresh for every order attempt
    async fn get_constraints(&self, symbol: &str) -> Result<VenueConstraints>;

    async fn submit_market_order(&self, request: &OrderRequest) -> Result<OrderConfirmation>;
}
