use thiserror::Error;

/// Failure taxonomy for the trading engine
///
/// Every variant is recoverable at the scope where it is raised: the control
/// loop degrades to "no trade" rather than terminating.
#[derive(Debug, Error)]
pub enum TradingError {
    /// Upstream market data could not be fetched or parsed
    #[error("data unavailable ({operation}): {reason}")]
    DataUnavailable {
        operation: &'static str,
        reason: String,
    },

    /// Venue metadata (lot size filter) could not be fetched
    #[error("venue constraints unavailable for {symbol}: {reason}")]
    ConstraintsUnavailable { symbol: String, reason: String },

    /// Venue declined the order
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// The request may or may not have reached the venue
    #[error("order status unknown for client id {client_order_id}: {reason}")]
    OrderStatusUnknown {
        client_order_id: uuid::Uuid,
        reason: String,
    },

    /// Local pre-check failed before submission
    #[error("quantity {quantity} rejected (min: {min_quantity}, max: {max_quantity})")]
    QuantityRejected {
        quantity: f64,
        min_quantity: f64,
        max_quantity: f64,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TradingError {
    pub fn data_unavailable(operation: &'static str, reason: impl ToString) -> Self {
        Self::DataUnavailable {
            operation,
            reason: reason.to_string(),
        }
    }

    /// True when a retry could submit the same order twice
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::OrderStatusUnknown { .. })
    }
}
