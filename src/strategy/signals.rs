use crate::indicators::{is_volume_spike, Indicators};
use crate::models::{PositionState, Signal};

/// Configuration for signal generation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalConfig {
    pub min_volume_factor: f64, // Multiple of average volume
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_volume_factor: 1.5,
        }
    }
}

/// Combine indicators with the current position into a signal
///
/// - Flat with rising trend and a volume spike: Enter
/// - Long: always EvaluateExit, trend and volume are irrelevant
/// - Anything else: Hold
pub fn generate_signal(
    indicators: &Indicators,
    latest_volume: f64,
    position: PositionState,
    config: &SignalConfig,
) -> Signal {
    if position == PositionState::Long {
        return Signal::EvaluateExit;
    }

    // Zero short MA means the window is too short
    if !indicators.has_short_ma() {
        return Signal::Hold;
    }

    let volume_ok = is_volume_spike(latest_volume, indicators.avg_volume, config.min_volume_factor);
    let trend_strength = indicators.short_ma - indicators.long_ma;

    tracing::debug!(
        short_ma = indicators.short_ma,
        long_ma = indicators.long_ma,
        avg_volume = indicators.avg_volume,
        latest_volume,
        trend_strength,
        volume_ok,
        "Signal inputs"
    );

    if volume_ok && trend_strength > 0.0 {
        Signal::Enter
    } else {
        Signal::Hold
    }
}
