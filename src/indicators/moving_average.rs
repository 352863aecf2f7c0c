/// Calculate Simple Moving Average (SMA) over the last `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Mean of every price in the slice
pub fn calculate_mean(prices: &[f64]) -> Option<f64> {
    calculate_sma(prices, prices.len())
}
