// Technical indicators module
// Short/long moving averages and baseline volume over the price window

pub mod moving_average;
pub mod volume;

pub use moving_average::{calculate_mean, calculate_sma};
pub use volume::{calculate_average_volume, is_volume_spike};

use crate::models::PriceSample;

/// Number of closes in the short moving average
pub const SHORT_MA_PERIOD: usize = 6;

/// Indicator values for one window
///
/// A zero field means "not enough data", never a real reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Indicators {
    pub short_ma: f64,
    pub long_ma: f64,
    pub avg_volume: f64,
}

impl Indicators {
    pub fn has_short_ma(&self) -> bool {
        self.short_ma > 0.0
    }
}

/// Compute indicators for a window ordered oldest to newest
///
/// Fails closed: a non-finite result collapses every field to zero.
pub fn compute_indicators(samples: &[PriceSample]) -> Indicators {
    let closes: Vec<f64> = samples.iter().map(|s| s.close).collect();

    let indicators = Indicators {
        short_ma: calculate_sma(&closes, SHORT_MA_PERIOD).unwrap_or(0.0),
        long_ma: calculate_mean(&closes).unwrap_or(0.0),
        avg_volume: calculate_average_volume(samples).unwrap_or(0.0),
    };

    let finite = indicators.short_ma.is_finite()
        && indicators.long_ma.is_finite()
        && indicators.avg_volume.is_finite();
    if !finite {
        tracing::warn!(
            samples = samples.len(),
            "Indicator computation produced non-finite values, treating as no data"
        );
        return Indicators::default();
    }

    indicators
}
