use crate::models::{ForecastResult, IntervalState};

/// Clamp-and-sensitivity interval adjustment
///
/// `next = clamp(current + delta * sensitivity, min, max)` where
/// sensitivity shrinks as volatility grows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalPolicy {
    pub base_sensitivity: f64,
    pub volatility_damping: f64,
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self {
            base_sensitivity: 1.0,
            volatility_damping: 1.0,
        }
    }
}

impl IntervalPolicy {
    pub fn sensitivity(&self, volatility: f64) -> f64 {
        let volatility = if volatility.is_finite() {
            volatility.max(0.0)
        } else {
            0.0
        };
        self.base_sensitivity / (1.0 + self.volatility_damping * volatility)
    }

    pub fn next_interval(&self, state: &IntervalState, forecast: &ForecastResult) -> f64 {
        let delta = if forecast.recommended_interval_delta.is_finite() {
            forecast.recommended_interval_delta
        } else {
            0.0
        };
        let proposed = state.current_interval + delta * self.sensitivity(forecast.volatility_score);
        proposed.clamp(state.min_interval, state.max_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forecast(delta: f64, volatility: f64) -> ForecastResult {
        let mut f = ForecastResult::neutral("m", 0);
        f.recommended_interval_delta = delta;
        f.volatility_score = volatility;
        f
    }

    #[test]
    fn test_sensitivity_shrinks_with_volatility() {
        let policy = IntervalPolicy::default();
        assert_eq!(policy.sensitivity(0.0), 1.0);
        assert_eq!(policy.sensitivity(1.0), 0.5);
        assert!(policy.sensitivity(4.0) < policy.sensitivity(1.0));
        assert_eq!(policy.sensitivity(f64::NAN), 1.0);
    }

    #[test]
    fn test_next_interval_clamps() {
        let policy = IntervalPolicy::default();
        let state = IntervalState::new("m", 30.0, 300.0, 600.0);

        assert_eq!(policy.next_interval(&state, &forecast(-60.0, 0.0)), 240.0);
        assert_eq!(policy.next_interval(&state, &forecast(-1000.0, 0.0)), 30.0);
        assert_eq!(policy.next_interval(&state, &forecast(1000.0, 0.0)), 600.0);
        assert_eq!(policy.next_interval(&state, &forecast(-60.0, 1.0)), 270.0);
        assert_eq!(policy.next_interval(&state, &forecast(f64::NAN, 0.0)), 300.0);
    }
}
