use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One candle as the strategy sees it: close and volume at a point in time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub volume: f64,
}

impl PriceSample {
    pub fn new(timestamp: DateTime<Utc>, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            close,
            volume,
        }
    }
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Enter,
    EvaluateExit,
    Hold,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    Long,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

/// Per-symbol quantity rules published by the venue (lot size filter)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VenueConstraints {
    pub min_quantity: f64,
    pub max_quantity: f64,
    pub step_size: f64,
}

/// A market order ready for submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRequest {
    /// Venues deduplicate on this id, so a resubmission reuses it
    pub client_order_id: Uuid,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderConfirmation {
    pub client_order_id: Uuid,
    pub executed_quantity: f64,
    /// Average fill price when the venue reports one
    pub fill_price: Option<f64>,
}

/// Completed entry or exit, kept for the trade log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    pub reason: Option<String>,
    pub realized_pnl: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_side_wire_names() {
        assert_eq!(TradeSide::Buy.as_str(), "BUY");
        assert_eq!(TradeSide::Sell.as_str(), "SELL");
    }

    #[test]
    fn test_order_request_serializes() {
        let request = OrderRequest {
            client_order_id: Uuid::new_v4(),
            symbol: "SOLBRL".to_string(),
            side: TradeSide::Buy,
            quantity: 1.25,
        };

        let json = serde_json::to_string(&request).unwrap();
        let back: OrderRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }
}
