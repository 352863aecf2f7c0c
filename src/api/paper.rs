use super::{BinanceClient, MarketDataSource, OrderVenue};
use crate::error::TradingError;
use crate::models::{OrderConfirmation, OrderRequest, PriceSample, TradeSide, VenueConstraints};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Paper-trading account on top of live Binance market data
///
/// Orders fill at the live ticker against simulated balances. Fills are
/// remembered by client order id so a resubmitted order is not filled twice.
pub struct PaperExchange {
    client: BinanceClient,
    symbol: String,
    base_asset: String,
    quote_asset: String,
    ledger: Mutex<PaperLedger>,
}

#[derive(Debug, Default)]
struct PaperLedger {
    balances: HashMap<String, f64>,
    fills: HashMap<Uuid, OrderConfirmation>,
}

impl PaperExchange {
    pub fn new(
        client: BinanceClient,
        symbol: impl Into<String>,
        base_asset: impl Into<String>,
        quote_asset: impl Into<String>,
        quote_balance: f64,
    ) -> Self {
        let base_asset = base_asset.into();
        let quote_asset = quote_asset.into();

        let mut balances = HashMap::new();
        balances.insert(base_asset.clone(), 0.0);
        balances.insert(quote_asset.clone(), quote_balance);

        Self {
            client,
            symbol: symbol.into(),
            base_asset,
            quote_asset,
            ledger: Mutex::new(PaperLedger {
                balances,
                fills: HashMap::new(),
            }),
        }
    }

    fn ledger(&self) -> Result<std::sync::MutexGuard<'_, PaperLedger>> {
        self.ledger
            .lock()
            .map_err(|e| TradingError::OrderRejected(format!("paper ledger poisoned: {}", e)))
    }

    /// Current simulated balance of `asset`
    pub fn balance(&self, asset: &str) -> f64 {
        self.ledger()
            .map(|l| l.balances.get(asset).copied().unwrap_or(0.0))
            .unwrap_or(0.0)
    }

    fn settle(&self, request: &OrderRequest, price: f64) -> Result<OrderConfirmation> {
        let mut ledger = self.ledger()?;

        // Another submission with this id may have settled while we fetched the price
        if let Some(previous) = ledger.fills.get(&request.client_order_id) {
            return Ok(previous.clone());
        }

        let notional = request.quantity * price;
        let base = ledger.balances.get(&self.base_asset).copied().unwrap_or(0.0);
        let quote = ledger.balances.get(&self.quote_asset).copied().unwrap_or(0.0);

        let (new_base, new_quote) = match request.side {
            TradeSide::Buy => {
                if notional > quote {
                    return Err(TradingError::OrderRejected(format!(
                        "insufficient {} balance: need {:.2}, have {:.2}",
                        self.quote_asset, notional, quote
                    )));
                }
                (base + request.quantity, quote - notional)
            }
            TradeSide::Sell => {
                if request.quantity > base {
                    return Err(TradingError::OrderRejected(format!(
                        "insufficient {} balance: need {}, have {}",
                        self.base_asset, request.quantity, base
                    )));
                }
                (base - request.quantity, quote + notional)
            }
        };

        ledger.balances.insert(self.base_asset.clone(), new_base);
        ledger.balances.insert(self.quote_asset.clone(), new_quote);

        let confirmation = OrderConfirmation {
            client_order_id: request.client_order_id,
            executed_quantity: request.quantity,
            fill_price: Some(price),
        };
        ledger
            .fills
            .insert(request.client_order_id, confirmation.clone());

        Ok(confirmation)
    }
}

#[async_trait]
impl MarketDataSource for PaperExchange {
    async fn get_recent_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<Vec<PriceSample>> {
        self.client.klines(symbol, timeframe, count).await
    }

    async fn get_latest_price(&self, symbol: &str) -> Result<f64> {
        self.client.ticker_price(symbol).await
    }

    async fn get_balance(&self, asset: &str) -> Result<f64> {
        let ledger = self
            .ledger
            .lock()
            .map_err(|e| TradingError::data_unavailable("balance", e))?;
        Ok(ledger.balances.get(asset).copied().unwrap_or(0.0))
    }
}

#[async_trait]
impl OrderVenue for PaperExchange {
    async fn get_constraints(&self, symbol: &str) -> Result<VenueConstraints> {
        self.client.lot_size(symbol).await
    }

    async fn submit_market_order(&self, request: &OrderRequest) -> Result<OrderConfirmation> {
        if request.symbol != self.symbol {
            return Err(TradingError::OrderRejected(format!(
                "paper account only trades {}, got {}",
                self.symbol, request.symbol
            )));
        }
        if !(request.quantity > 0.0) {
            return Err(TradingError::OrderRejected(format!(
                "invalid quantity {}",
                request.quantity
            )));
        }

        let previous = self.ledger()?.fills.get(&request.client_order_id).cloned();
        if let Some(previous) = previous {
            tracing::info!(
                client_order_id = %request.client_order_id,
                "Duplicate paper order, returning previous fill"
            );
            return Ok(previous);
        }

        let price = self.client.ticker_price(&request.symbol).await.map_err(|e| {
            TradingError::OrderRejected(format!("no fill price available: {}", e))
        })?;

        let confirmation = self.settle(request, price)?;

        tracing::info!(
            side = request.side.as_str(),
            symbol = %request.symbol,
            quantity = request.quantity,
            price,
            "📝 Paper order filled"
        );

        Ok(confirmation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::time::Duration;

    async fn exchange_with_price(server: &mut mockito::Server, price: &str) -> PaperExchange {
        server
            .mock("GET", "/api/v3/ticker/price")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!(r#"{{"symbol":"SOLBRL","price":"{}"}}"#, price))
            .create_async()
            .await;

        let client = BinanceClient::new(server.url())
            .unwrap()
            .with_retry_policy(1, Duration::from_millis(1));
        PaperExchange::new(client, "SOLBRL", "SOL", "BRL", 1000.0)
    }

    fn order(side: TradeSide, quantity: f64) -> OrderRequest {
        OrderRequest {
            client_order_id: Uuid::new_v4(),
            symbol: "SOLBRL".to_string(),
            side,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_buy_then_sell_moves_balances() {
        let mut server = mockito::Server::new_async().await;
        let exchange = exchange_with_price(&mut server, "100.0").await;

        let fill = exchange
            .submit_market_order(&order(TradeSide::Buy, 2.0))
            .await
            .unwrap();
        assert_eq!(fill.fill_price, Some(100.0));
        assert_eq!(exchange.balance("SOL"), 2.0);
        assert_eq!(exchange.get_balance("BRL").await.unwrap(), 800.0);

        exchange
            .submit_market_order(&order(TradeSide::Sell, 2.0))
            .await
            .unwrap();
        assert_eq!(exchange.balance("SOL"), 0.0);
        assert_eq!(exchange.balance("BRL"), 1000.0);
    }

    #[tokio::test]
    async fn test_insufficient_funds_rejected() {
        let mut server = mockito::Server::new_async().await;
        let exchange = exchange_with_price(&mut server, "100.0").await;

        let result = exchange
            .submit_market_order(&order(TradeSide::Buy, 20.0))
            .await;
        assert!(matches!(result, Err(TradingError::OrderRejected(_))));
        assert_eq!(exchange.balance("BRL"), 1000.0);

        let result = exchange
            .submit_market_order(&order(TradeSide::Sell, 1.0))
            .await;
        assert!(matches!(result, Err(TradingError::OrderRejected(_))));
    }

    #[tokio::test]
    async fn test_duplicate_client_id_fills_once() {
        let mut server = mockito::Server::new_async().await;
        let exchange = exchange_with_price(&mut server, "100.0").await;

        let request = order(TradeSide::Buy, 1.0);
        let first = exchange.submit_market_order(&request).await.unwrap();
        let second = exchange.submit_market_order(&request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(exchange.balance("SOL"), 1.0);
        assert_eq!(exchange.balance("BRL"), 900.0);
    }

    #[tokio::test]
    async fn test_other_symbol_rejected() {
        let mut server = mockito::Server::new_async().await;
        let exchange = exchange_with_price(&mut server, "100.0").await;

        let mut request = order(TradeSide::Buy, 1.0);
        request.symbol = "BTCUSDT".to_string();
        let result = exchange.submit_market_order(&request).await;
        assert!(matches!(result, Err(TradingError::OrderRejected(_))));
    }

    #[tokio::test]
    async fn test_unknown_asset_balance_is_zero() {
        let mut server = mockito::Server::new_async().await;
        let exchange = exchange_with_price(&mut server, "100.0").await;
        assert_eq!(exchange.get_balance("ETH").await.unwrap(), 0.0);
    }
}
