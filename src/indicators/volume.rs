//! Volume analysis
//!
//! The average leaves out the newest sample so the latest volume is compared
//! against a baseline it did not contribute to.

use crate::models::PriceSample;

/// Average volume of every sample except the most recent one
///
/// Returns None with fewer than two samples.
pub fn calculate_average_volume(samples: &[PriceSample]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }

    let baseline = &samples[..samples.len() - 1];
    let total_volume: f64 = baseline.iter().map(|s| s.volume).sum();
    Some(total_volume / baseline.len() as f64)
}

/// Check if the latest volume beats the baseline by `factor`
pub fn is_volume_spike(latest_volume: f64, average_volume: f64, factor: f64) -> bool {
    latest_volume > average_volume * factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(volume: f64) -> PriceSample {
        PriceSample::new(Utc::now(), 100.0, volume)
    }

    #[test]
    fn test_average_volume_excludes_latest() {
        let samples = vec![sample(1000.0), sample(2000.0), sample(3000.0), sample(99_000.0)];
        assert_eq!(calculate_average_volume(&samples), Some(2000.0));
    }

    #[test]
    fn test_average_volume_needs_two_samples() {
        assert!(calculate_average_volume(&[]).is_none());
        assert!(calculate_average_volume(&[sample(500.0)]).is_none());
        assert_eq!(calculate_average_volume(&[sample(500.0), sample(1.0)]), Some(500.0));
    }

    #[test]
    fn test_volume_spike_is_strict() {
        assert!(is_volume_spike(1501.0, 1000.0, 1.5));
        assert!(!is_volume_spike(1500.0, 1000.0, 1.5));
    }
}
