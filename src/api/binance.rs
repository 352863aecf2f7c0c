use crate::error::TradingError;
use crate::models::{PriceSample, VenueConstraints};
use crate::Result;
use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

pub const BINANCE_API_BASE: &str = "https://api.binance.com";
const RATE_LIMIT_RPM: u32 = 600; // Well under the 1200 weight/minute IP limit
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000; // Start with 2 seconds
const REQUEST_TIMEOUT_SECS: u64 = 15;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for Binance public market data endpoints
///
/// Cloneable; clones share the rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
    max_retries: u32,
    initial_backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LotSizeFilter {
    min_qty: String,
    max_qty: String,
    step_size: String,
}

/// Transport-level failure, before mapping into the domain taxonomy
#[derive(Debug)]
struct RequestError(String);

impl BinanceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| TradingError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override retry count and first backoff delay
    pub fn with_retry_policy(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Rate-limited GET with exponential backoff on 429, 5xx and transport errors
    async fn get(&self, path: &str, query: &[(&str, String)]) -> std::result::Result<reqwest::Response, RequestError> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=self.max_retries {
            self.rate_limiter.until_ready().await;

            match self.client.get(&url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        if attempt > 1 {
                            tracing::info!("✓ {} succeeded after {} attempts", path, attempt);
                        }
                        return Ok(response);
                    }

                    let body = response.text().await.unwrap_or_default();
                    last_error = format!("HTTP {}: {}", status, body);

                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !retryable {
                        return Err(RequestError(last_error));
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < self.max_retries {
                let backoff = self.initial_backoff * 2_u32.pow(attempt - 1);
                tracing::warn!(
                    "Attempt {}/{} failed for {}: {}. Retrying in {:?}...",
                    attempt,
                    self.max_retries,
                    path,
                    last_error,
                    backoff
                );
                sleep(backoff).await;
            }
        }

        Err(RequestError(last_error))
    }

    /// Recent klines, oldest first
    pub async fn klines(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<PriceSample>> {
        const OP: &str = "klines";

        let response = self
            .get(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await
            .map_err(|e| TradingError::data_unavailable(OP, e.0))?;

        // Binance klines format: [open_time, open, high, low, close, volume, ...]
        let rows: Vec<Vec<serde_json::Value>> = response
            .json()
            .await
            .map_err(|e| TradingError::data_unavailable(OP, e))?;

        rows.iter()
            .map(|row| parse_kline(row).ok_or_else(|| TradingError::data_unavailable(OP, format!("malformed kline row: {:?}", row))))
            .collect()
    }

    pub async fn ticker_price(&self, symbol: &str) -> Result<f64> {
        const OP: &str = "ticker_price";

        let response = self
            .get("/api/v3/ticker/price", &[("symbol", symbol.to_string())])
            .await
            .map_err(|e| TradingError::data_unavailable(OP, e.0))?;

        let ticker: TickerPrice = response
            .json()
            .await
            .map_err(|e| TradingError::data_unavailable(OP, e))?;

        ticker
            .price
            .parse::<f64>()
            .map_err(|e| TradingError::data_unavailable(OP, format!("bad price '{}': {}", ticker.price, e)))
    }

    /// LOT_SIZE filter for `symbol`
    pub async fn lot_size(&self, symbol: &str) -> Result<VenueConstraints> {
        let unavailable = |reason: String| TradingError::ConstraintsUnavailable {
            symbol: symbol.to_string(),
            reason,
        };

        let response = self
            .get("/api/v3/exchangeInfo", &[("symbol", symbol.to_string())])
            .await
            .map_err(|e| unavailable(e.0))?;

        let info: ExchangeInfo = response.json().await.map_err(|e| unavailable(e.to_string()))?;

        let symbol_info = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| unavailable("symbol not listed in exchangeInfo".to_string()))?;

        let filter = symbol_info
            .filters
            .into_iter()
            .find(|f| f.get("filterType").and_then(|t| t.as_str()) == Some("LOT_SIZE"))
            .ok_or_else(|| {
                TradingError::Configuration(format!("LOT_SIZE filter not found for {}", symbol))
            })?;

        let lot: LotSizeFilter =
            serde_json::from_value(filter).map_err(|e| TradingError::Configuration(e.to_string()))?;

        let parse = |field: &str, value: &str| {
            value
                .parse::<f64>()
                .map_err(|e| TradingError::Configuration(format!("bad {} '{}': {}", field, value, e)))
        };

        Ok(VenueConstraints {
            min_quantity: parse("minQty", &lot.min_qty)?,
            max_quantity: parse("maxQty", &lot.max_qty)?,
            step_size: parse("stepSize", &lot.step_size)?,
        })
    }
}

fn parse_kline(row: &[serde_json::Value]) -> Option<PriceSample> {
    if row.len() < 6 {
        return None;
    }

    let open_time_ms = row[0].as_i64()?;
    let close = row[4].as_str()?.parse::<f64>().ok()?;
    let volume = row[5].as_str()?.parse::<f64>().ok()?;
    let timestamp = Utc.timestamp_millis_opt(open_time_ms).single()?;

    Some(PriceSample::new(timestamp, close, volume))
}
