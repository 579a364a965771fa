//! The skill reliability model.
//!
//! Success moves confidence a fixed fraction of the remaining distance to the
//! ceiling; failure removes a larger fraction of the distance to the floor.
//! Repeated outcomes therefore converge geometrically and never leave `[0, 1]`.

use reflex_config::ConfidenceConfig;

pub const FLOOR: f64 = 0.0;
pub const CEILING: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceModel {
    pub initial: f64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub prune_floor: f64,
    pub reliable_threshold: f64,
}

impl Default for ConfidenceModel {
    fn default() -> Self {
        Self::from_config(&ConfidenceConfig::default())
    }
}

impl ConfidenceModel {
    pub fn from_config(config: &ConfidenceConfig) -> Self {
        Self {
            initial: config.initial.clamp(FLOOR, CEILING),
            success_rate: config.success_rate,
            failure_rate: config.failure_rate,
            prune_floor: config.prune_floor,
            reliable_threshold: config.reliable_threshold,
        }
    }

    /// Confidence after one replay outcome.
    pub fn apply(&self, confidence: f64, success: bool) -> f64 {
        let c = confidence.clamp(FLOOR, CEILING);
        let next = if success {
            c + self.success_rate * (CEILING - c)
        } else {
            c - self.failure_rate * (c - FLOOR)
        };
        next.clamp(FLOOR, CEILING)
    }

    /// Pruned skills are excluded from candidate search.
    pub fn is_pruned(&self, confidence: f64) -> bool {
        confidence < self.prune_floor
    }

    pub fn is_reliable(&self, confidence: f64) -> bool {
        confidence >= self.reliable_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ConfidenceModel {
        ConfidenceModel::default()
    }

    #[test]
    fn success_step_from_initial() {
        let m = model();
        assert!((m.apply(0.5, true) - 0.55).abs() < 1e-12);
        assert!((m.apply(0.5, false) - 0.35).abs() < 1e-12);
    }

    #[test]
    fn success_strictly_increases_below_ceiling() {
        let m = model();
        let mut c = 0.0;
        for _ in 0..200 {
            let next = m.apply(c, true);
            assert!(next > c || c == CEILING);
            assert!(next <= CEILING);
            c = next;
        }
        assert!(c > 0.99);
    }

    #[test]
    fn failure_strictly_decreases_above_floor() {
        let m = model();
        let mut c = 1.0;
        for _ in 0..200 {
            let next = m.apply(c, false);
            assert!(next < c || c == FLOOR);
            assert!(next >= FLOOR);
            c = next;
        }
        assert!(c < 0.01);
    }

    #[test]
    fn bounds_are_fixed_points() {
        let m = model();
        assert_eq!(m.apply(CEILING, true), CEILING);
        assert_eq!(m.apply(FLOOR, false), FLOOR);
    }

    #[test]
    fn out_of_range_input_is_clamped() {
        let m = model();
        assert!(m.apply(1.7, true) <= CEILING);
        assert!(m.apply(-0.3, false) >= FLOOR);
    }

    #[test]
    fn one_failure_undoes_several_successes() {
        let m = model();
        for start in [0.3, 0.5, 0.7, 0.9] {
            let gained = m.apply(start, true) - start;
            let lost = start - m.apply(start, false);
            assert!(lost > gained, "at {start}: lost {lost} <= gained {gained}");
        }
        // From 0.9: three successes then one failure ends lower than it started.
        let mut c = 0.9;
        for _ in 0..3 {
            c = m.apply(c, true);
        }
        c = m.apply(c, false);
        assert!(c < 0.9);
    }

    #[test]
    fn thresholds() {
        let m = model();
        assert!(m.is_pruned(0.19));
        assert!(!m.is_pruned(0.2));
        assert!(m.is_reliable(0.7));
        assert!(!m.is_reliable(0.69));
    }

    #[test]
    fn repeated_failures_prune_a_new_skill() {
        let m = model();
        let mut c = m.initial;
        let mut failures = 0;
        while !m.is_pruned(c) {
            c = m.apply(c, false);
            failures += 1;
        }
        // 0.5 → 0.35 → 0.245 → 0.1715
        assert_eq!(failures, 3);
    }
}
