//! Conflict-risk (RC) scorer and hysteresis posture machine (§4.2).

use custodian_types::{RcConflictSignals, RcConflictWeights, RcState};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RcError {
    #[error("rc score out of range [0,1]: {0}")]
    ScoreOutOfRange(f64),

    #[error("threshold invariant violated: expected 0 <= t_low < t_high < t_lock <= 1, got {t_low}, {t_high}, {t_lock}")]
    InvalidThresholds { t_low: f64, t_high: f64, t_lock: f64 },
}

/// Weighted-average conflict-risk score, clamped to `[0,1]`.
///
/// `score = Σ(signal_i · weight_i) / Σ(weight_i)`. Signal and weight
/// validity is already enforced by `RcConflictSignals`/`RcConflictWeights`
/// construction, so this never fails.
pub fn score(signals: &RcConflictSignals, weights: &RcConflictWeights) -> f64 {
    let signal_values = signals.weighted();
    let weight_values = weights.weighted();
    let weight_sum: f64 = weight_values.iter().sum();
    let weighted_sum: f64 = signal_values
        .iter()
        .zip(weight_values.iter())
        .map(|(signal, weight)| signal * weight)
        .sum();
    (weighted_sum / weight_sum).clamp(0.0, 1.0)
}

/// Three-state posture machine with asymmetric thresholds that prevent
/// rapid oscillation between postures; lockdown never drops directly to
/// normal (§4.2).
#[derive(Debug, Clone, Copy)]
pub struct RcHysteresis {
    t_low: f64,
    t_high: f64,
    t_lock: f64,
    state: RcState,
}

impl RcHysteresis {
    /// Default thresholds: `0.35, 0.65, 0.9`.
    pub fn new() -> Self {
        Self::with_thresholds(0.35, 0.65, 0.9).expect("default thresholds satisfy invariant")
    }

    pub fn with_thresholds(t_low: f64, t_high: f64, t_lock: f64) -> Result<Self, RcError> {
        if !(0.0 <= t_low && t_low < t_high && t_high < t_lock && t_lock <= 1.0) {
            return Err(RcError::InvalidThresholds {
                t_low,
                t_high,
                t_lock,
            });
        }
        Ok(Self {
            t_low,
            t_high,
            t_lock,
            state: RcState::Normal,
        })
    }

    pub fn state(&self) -> RcState {
        self.state
    }

    pub fn t_high(&self) -> f64 {
        self.t_high
    }

    /// Applies one score update and returns the resulting state.
    pub fn update(&mut self, score: f64) -> Result<RcState, RcError> {
        if !(0.0..=1.0).contains(&score) {
            return Err(RcError::ScoreOutOfRange(score));
        }

        let previous = self.state;
        self.state = if score >= self.t_lock {
            RcState::Lockdown
        } else if self.state == RcState::Normal && score >= self.t_high {
            RcState::Verify
        } else if matches!(self.state, RcState::Verify | RcState::Lockdown) && score <= self.t_low
        {
            RcState::Normal
        } else if self.state == RcState::Lockdown && score > self.t_low && score < self.t_lock {
            RcState::Verify
        } else {
            self.state
        };

        if previous != self.state {
            tracing::info!(score, from = %previous, to = %self.state, "rc posture transition");
        }
        Ok(self.state)
    }
}

impl Default for RcHysteresis {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodian_types::RcConflictWeights;

    #[test]
    fn scoring_matches_scenario_7() {
        let weights = RcConflictWeights::new(0.4, 0.3, 0.2, 0.1).unwrap();
        let signals = RcConflictSignals::new(1.0, 0.5, 0.0, 0.0).unwrap();
        let result = score(&signals, &weights);
        assert!((result - 0.55).abs() < 1e-9);
    }

    #[test]
    fn hysteresis_flow_matches_scenario_5() {
        let mut machine = RcHysteresis::new();
        let updates = [0.1, 0.7, 0.8, 0.92, 0.7, 0.2];
        let expected = [
            RcState::Normal,
            RcState::Verify,
            RcState::Verify,
            RcState::Lockdown,
            RcState::Verify,
            RcState::Normal,
        ];
        for (score_value, expected_state) in updates.iter().zip(expected.iter()) {
            let state = machine.update(*score_value).unwrap();
            assert_eq!(state, *expected_state);
        }
    }

    #[test]
    fn lockdown_never_drops_directly_to_normal() {
        let mut machine = RcHysteresis::new();
        machine.update(0.95).unwrap();
        assert_eq!(machine.state(), RcState::Lockdown);
        // A low score while in lockdown steps down to VERIFY, not NORMAL.
        let state = machine.update(0.1).unwrap();
        assert_eq!(state, RcState::Verify);
    }

    #[test]
    fn boundary_exactly_at_t_high_and_t_lock() {
        let mut machine = RcHysteresis::new();
        assert_eq!(machine.update(0.65).unwrap(), RcState::Verify);
        let mut machine = RcHysteresis::new();
        assert_eq!(machine.update(0.9).unwrap(), RcState::Lockdown);
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        let mut machine = RcHysteresis::new();
        assert!(machine.update(1.5).is_err());
        assert!(machine.update(-0.1).is_err());
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        assert!(RcHysteresis::with_thresholds(0.7, 0.5, 0.9).is_err());
    }

    proptest::proptest! {
        #[test]
        fn score_is_always_in_unit_interval(
            s0 in 0.0f64..=1.0, s1 in 0.0f64..=1.0, s2 in 0.0f64..=1.0, s3 in 0.0f64..=1.0,
            w0 in 0.01f64..=1.0, w1 in 0.01f64..=1.0, w2 in 0.01f64..=1.0, w3 in 0.01f64..=1.0,
        ) {
            let signals = RcConflictSignals::new(s0, s1, s2, s3).unwrap();
            let weights = RcConflictWeights::new(w0, w1, w2, w3).unwrap();
            let result = score(&signals, &weights);
            proptest::prop_assert!((0.0..=1.0).contains(&result));
        }

        #[test]
        fn score_at_or_above_t_lock_always_locks_down(s in 0.9f64..=1.0) {
            let mut machine = RcHysteresis::new();
            let state = machine.update(s).unwrap();
            proptest::prop_assert_eq!(state, RcState::Lockdown);
        }
    }
}
