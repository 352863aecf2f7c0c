// Trading strategy module
pub mod signals;

use crate::indicators::{compute_indicators, Indicators};
use crate::models::{PositionState, PriceSample, Signal};
use signals::{generate_signal, SignalConfig};

/// Base trait for trading strategies
pub trait Strategy: Send + Sync {
    /// Evaluate a window (newest last) given the current position
    fn evaluate(&self, samples: &[PriceSample], position: PositionState) -> Evaluation;

    /// Get strategy name
    fn name(&self) -> &str;
}

/// Indicators together with the signal they produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub indicators: Indicators,
    pub latest_volume: f64,
    pub signal: Signal,
}

/// Moving-average crossover confirmed by a volume spike
#[derive(Debug, Clone, Default)]
pub struct TrendVolumeStrategy {
    config: SignalConfig,
}

impl TrendVolumeStrategy {
    pub fn new(min_volume_factor: f64) -> Self {
        Self {
            config: SignalConfig { min_volume_factor },
        }
    }
}

impl Strategy for TrendVolumeStrategy {
    fn evaluate(&self, samples: &[PriceSample], position: PositionState) -> Evaluation {
        let indicators = compute_indicators(samples);
        let latest_volume = samples.last().map(|s| s.volume).unwrap_or(0.0);
        let signal = generate_signal(&indicators, latest_volume, position, &self.config);

        Evaluation {
            indicators,
            latest_volume,
            signal,
        }
    }

    fn name(&self) -> &str {
        "trend_volume"
    }
}
