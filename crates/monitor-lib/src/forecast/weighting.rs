//! Mapping from trend signals to interval deltas

use super::TrendSignal;
use crate::models::TrendDirection;

/// Converts a trend signal into a signed interval change in seconds
pub trait DeltaWeighting: Send + Sync {
    fn delta(&self, signal: &TrendSignal) -> f64;
}

/// Blends trend direction with load pressure, scaled by a fixed step
///
/// Rising trends and high load shorten the interval; falling trends and
/// quiescent load lengthen it. An emergency always applies the full
/// negative cap.
#[derive(Debug, Clone)]
pub struct ProportionalWeighting {
    pub step_secs: f64,
    pub max_step_secs: f64,
    /// Share of the score taken from the trend; the rest comes from load pressure
    pub trend_weight: f64,
}

impl Default for ProportionalWeighting {
    fn default() -> Self {
        Self {
            step_secs: 60.0,
            max_step_secs: 120.0,
            trend_weight: 0.5,
        }
    }
}

impl DeltaWeighting for ProportionalWeighting {
    fn delta(&self, signal: &TrendSignal) -> f64 {
        if signal.emergency {
            return -self.max_step_secs;
        }

        let bias = match signal.direction {
            TrendDirection::Rising => -1.0,
            TrendDirection::Falling => 1.0,
            TrendDirection::Stable => 0.0,
        } * signal.trend_strength.abs();

        let score = self.trend_weight * bias - (1.0 - self.trend_weight) * signal.load_pressure;
        (score * self.step_secs).clamp(-self.max_step_secs, self.max_step_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(direction: TrendDirection, strength: f64, pressure: f64) -> TrendSignal {
        TrendSignal {
            direction,
            trend_strength: strength,
            load_pressure: pressure,
            volatility: 0.1,
            confidence: 0.8,
            emergency: false,
        }
    }

    #[test]
    fn test_rising_shortens_interval() {
        let w = ProportionalWeighting::default();
        assert!(w.delta(&signal(TrendDirection::Rising, 0.8, 0.5)) < 0.0);
    }

    #[test]
    fn test_falling_lengthens_interval() {
        let w = ProportionalWeighting::default();
        assert!(w.delta(&signal(TrendDirection::Falling, -0.8, -0.5)) > 0.0);
    }

    #[test]
    fn test_stable_midband_is_zero() {
        let w = ProportionalWeighting::default();
        assert_eq!(w.delta(&signal(TrendDirection::Stable, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn test_emergency_applies_cap() {
        let w = ProportionalWeighting::default();
        let mut s = signal(TrendDirection::Falling, -1.0, -1.0);
        s.emergency = true;
        assert_eq!(w.delta(&s), -120.0);
    }

    #[test]
    fn test_delta_is_capped() {
        let w = ProportionalWeighting {
            step_secs: 500.0,
            ..Default::default()
        };
        assert_eq!(w.delta(&signal(TrendDirection::Rising, 1.0, 1.0)), -120.0);
    }
}
