use std::time::Duration;

use crate::config::GenerationSettings;
use crate::models::params::DEFAULT_STEPS;

/// Estimated total duration for `num_steps`, clamped to the configured bounds.
pub fn baseline_for(num_steps: u32, settings: &GenerationSettings) -> Duration {
    let steps = if num_steps == 0 { DEFAULT_STEPS } else { num_steps };
    // max-then-min rather than clamp: inverted bounds must not panic.
    settings
        .per_step
        .saturating_mul(steps)
        .max(settings.min_baseline)
        .min(settings.max_baseline)
}

/// Fabricated progress: elapsed time over the baseline, never above the cap
/// and never moving backwards.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    baseline_ms: u128,
    cap: u8,
    shown: u8,
}

impl ProgressEstimator {
    pub fn new(num_steps: u32, settings: &GenerationSettings) -> Self {
        Self {
            baseline_ms: baseline_for(num_steps, settings).as_millis().max(1),
            cap: settings.progress_cap,
            shown: 0,
        }
    }

    pub fn percent_at(&self, elapsed: Duration) -> u8 {
        let pct = elapsed.as_millis() * 100 / self.baseline_ms;
        pct.min(self.cap as u128) as u8
    }

    /// Returns the new percentage only when it strictly increased.
    pub fn observe(&mut self, elapsed: Duration) -> Option<u8> {
        let pct = self.percent_at(elapsed);
        if pct > self.shown {
            self.shown = pct;
            Some(pct)
        } else {
            None
        }
    }

    pub fn shown(&self) -> u8 {
        self.shown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_clamped() {
        let settings = GenerationSettings::default();
        assert_eq!(baseline_for(1, &settings), Duration::from_millis(4_000));
        assert_eq!(baseline_for(20, &settings), Duration::from_millis(12_000));
        assert_eq!(baseline_for(100, &settings), Duration::from_millis(20_000));
        assert_eq!(baseline_for(0, &settings), Duration::from_millis(12_000));
    }

    #[test]
    fn test_progress_caps_at_95() {
        let estimator = ProgressEstimator::new(20, &GenerationSettings::default());
        assert_eq!(estimator.percent_at(Duration::from_millis(6_000)), 50);
        assert_eq!(estimator.percent_at(Duration::from_millis(11_999)), 95);
        assert_eq!(estimator.percent_at(Duration::from_secs(300)), 95);
    }

    #[test]
    fn test_observe_only_reports_increases() {
        let mut estimator = ProgressEstimator::new(20, &GenerationSettings::default());
        assert_eq!(estimator.observe(Duration::from_millis(50)), None);
        assert_eq!(estimator.observe(Duration::from_millis(150)), Some(1));
        assert_eq!(estimator.observe(Duration::from_millis(160)), None);
        assert_eq!(estimator.observe(Duration::from_millis(100)), None);
        assert_eq!(estimator.observe(Duration::from_millis(1_200)), Some(10));
        assert_eq!(estimator.shown(), 10);
    }

    #[test]
    fn test_inverted_bounds_do_not_panic() {
        let settings = GenerationSettings {
            min_baseline: Duration::from_secs(30),
            max_baseline: Duration::from_secs(5),
            ..GenerationSettings::default()
        };
        assert_eq!(baseline_for(20, &settings), Duration::from_secs(5));
        assert_eq!(ProgressEstimator::new(20, &settings).percent_at(Duration::from_secs(1)), 20);
    }
}
