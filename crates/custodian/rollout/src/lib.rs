//! Rollout planner: builds and ranks pre-commit candidates without
//! executing actions or writing to the ledger (§4.10).

use std::collections::HashMap;

use custodian_router::{route_llm_output, RouterError};
use custodian_types::{EffectClass, Envelope, RcConflictSignals};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("rollout signal out of range [0,1]: {name}={value}")]
    SignalOutOfRange { name: &'static str, value: f64 },

    #[error("rollout weights must be non-negative and sum to more than zero")]
    InvalidWeights,

    #[error(transparent)]
    Routing(#[from] RouterError),
}

/// One caller-supplied proposal to evaluate pre-commit (§4.10).
#[derive(Debug, Clone)]
pub struct RolloutProposal {
    pub proposal_text: String,
    pub action_class: String,
    pub scope: String,
    pub effect_class: EffectClass,
    pub command: Vec<String>,
    pub trajectory_reference: String,
    pub model_call_id: Option<String>,
    pub prompt_hash: Option<String>,
    pub input_provenance: Vec<String>,
    /// This candidate's own conflict-risk signals, carried per-candidate so
    /// distinct rollout alternatives can score distinct conflict risk
    /// instead of collapsing onto one shared step-level score (§2, §4.2).
    pub rc_signals: Option<RcConflictSignals>,
}

impl RolloutProposal {
    pub fn new(
        proposal_text: impl Into<String>,
        action_class: impl Into<String>,
        scope: impl Into<String>,
        effect_class: EffectClass,
        command: Vec<String>,
        trajectory_reference: impl Into<String>,
    ) -> Self {
        Self {
            proposal_text: proposal_text.into(),
            action_class: action_class.into(),
            scope: scope.into(),
            effect_class,
            command,
            trajectory_reference: trajectory_reference.into(),
            model_call_id: None,
            prompt_hash: None,
            input_provenance: Vec::new(),
            rc_signals: None,
        }
    }

    pub fn with_input_provenance(mut self, input_provenance: Vec<String>) -> Self {
        self.input_provenance = input_provenance;
        self
    }

    pub fn with_rc_signals(mut self, rc_signals: RcConflictSignals) -> Self {
        self.rc_signals = Some(rc_signals);
        self
    }
}

/// A proposal paired with the routed `TRAJ` envelope that admitted it
/// (§4.10).
#[derive(Debug, Clone)]
pub struct RolloutCandidate {
    pub envelope: Envelope,
    pub action_class: String,
    pub scope: String,
    pub effect_class: EffectClass,
    pub command: Vec<String>,
    pub trajectory_reference: String,
    pub rc_signals: Option<RcConflictSignals>,
}

/// Viability/valence signal pair for one candidate, both in `[0,1]`,
/// default 0.5 (§4.10).
#[derive(Debug, Clone, Copy)]
pub struct RolloutSignals {
    pub viability: f64,
    pub valence: f64,
}

impl Default for RolloutSignals {
    fn default() -> Self {
        Self {
            viability: 0.5,
            valence: 0.5,
        }
    }
}

impl RolloutSignals {
    pub fn new(viability: f64, valence: f64) -> Result<Self, RolloutError> {
        let signals = Self { viability, valence };
        signals.validate()?;
        Ok(signals)
    }

    fn validate(&self) -> Result<(), RolloutError> {
        if !(0.0..=1.0).contains(&self.viability) {
            return Err(RolloutError::SignalOutOfRange {
                name: "viability",
                value: self.viability,
            });
        }
        if !(0.0..=1.0).contains(&self.valence) {
            return Err(RolloutError::SignalOutOfRange {
                name: "valence",
                value: self.valence,
            });
        }
        Ok(())
    }
}

/// Weights combining viability and valence into a ranking score. Default
/// `0.6, 0.4` (§4.10).
#[derive(Debug, Clone, Copy)]
pub struct RolloutWeights {
    pub viability: f64,
    pub valence: f64,
}

impl Default for RolloutWeights {
    fn default() -> Self {
        Self {
            viability: 0.6,
            valence: 0.4,
        }
    }
}

impl RolloutWeights {
    pub fn new(viability: f64, valence: f64) -> Result<Self, RolloutError> {
        let weights = Self { viability, valence };
        weights.validate()?;
        Ok(weights)
    }

    fn validate(&self) -> Result<(), RolloutError> {
        if self.viability < 0.0 || self.valence < 0.0 || self.total() <= 0.0 {
            return Err(RolloutError::InvalidWeights);
        }
        Ok(())
    }

    fn total(&self) -> f64 {
        self.viability + self.valence
    }
}

/// A ranked candidate: its signals and the resulting `ranking_score`
/// (§4.10).
#[derive(Debug, Clone)]
pub struct RolloutEvaluation {
    pub candidate: RolloutCandidate,
    pub viability_score: f64,
    pub valence_score: f64,
    pub ranking_score: f64,
}

/// Builds rollout candidates from proposals and ranks them by a weighted
/// combination of viability and valence (§4.10).
pub struct RolloutPlanner {
    weights: RolloutWeights,
}

impl RolloutPlanner {
    pub fn new(weights: RolloutWeights) -> Self {
        Self { weights }
    }

    /// For each proposal, routes it with role `"rollout"` (payload type
    /// becomes `TRAJ`) and pairs the envelope with the action/scope/effect/
    /// command/trajectory-reference (§4.10).
    pub fn build_candidates(
        &self,
        proposals: &[RolloutProposal],
    ) -> Result<Vec<RolloutCandidate>, RolloutError> {
        let mut candidates = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            let envelope = route_llm_output(
                &proposal.proposal_text,
                "rollout",
                proposal.model_call_id.as_deref(),
                proposal.prompt_hash.as_deref(),
                proposal.input_provenance.clone(),
                proposal.effect_class,
            )?;
            candidates.push(RolloutCandidate {
                envelope,
                action_class: proposal.action_class.clone(),
                scope: proposal.scope.clone(),
                effect_class: proposal.effect_class,
                command: proposal.command.clone(),
                trajectory_reference: proposal.trajectory_reference.clone(),
                rc_signals: proposal.rc_signals,
            });
        }
        Ok(candidates)
    }

    /// Ranks candidates descending by `ranking_score`, stable with respect
    /// to input order on ties (§4.10, §8).
    pub fn rank_candidates(
        &self,
        candidates: Vec<RolloutCandidate>,
        signal_overrides: &HashMap<String, RolloutSignals>,
    ) -> Result<Vec<RolloutEvaluation>, RolloutError> {
        let mut ranked = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let signals = signal_overrides
                .get(&candidate.trajectory_reference)
                .copied()
                .unwrap_or_default();
            signals.validate()?;
            let ranking_score = (signals.viability * self.weights.viability
                + signals.valence * self.weights.valence)
                / self.weights.total();
            ranked.push(RolloutEvaluation {
                candidate,
                viability_score: signals.viability,
                valence_score: signals.valence,
                ranking_score,
            });
        }
        ranked.sort_by(|a, b| {
            b.ranking_score
                .partial_cmp(&a.ranking_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        tracing::debug!(count = ranked.len(), "ranked rollout candidates");
        Ok(ranked)
    }
}

impl Default for RolloutPlanner {
    fn default() -> Self {
        Self::new(RolloutWeights::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(trajectory_reference: &str) -> RolloutProposal {
        RolloutProposal::new(
            "plan text",
            "WRITE_FILE",
            "workspace:project",
            EffectClass::Reversible,
            vec!["echo".to_string(), "ok".to_string()],
            trajectory_reference,
        )
    }

    #[test]
    fn rollout_role_yields_traj_envelopes() {
        let planner = RolloutPlanner::default();
        let candidates = planner.build_candidates(&[proposal("traj-a")]).unwrap();
        assert_eq!(candidates[0].envelope.payload_type, custodian_types::PayloadType::Traj);
    }

    #[test]
    fn ranking_matches_scenario_8() {
        let planner = RolloutPlanner::default();
        let candidates = planner
            .build_candidates(&[proposal("A"), proposal("B")])
            .unwrap();
        let mut overrides = HashMap::new();
        overrides.insert("A".to_string(), RolloutSignals::new(0.9, 0.7).unwrap());
        overrides.insert("B".to_string(), RolloutSignals::new(0.4, 0.9).unwrap());
        let ranked = planner.rank_candidates(candidates, &overrides).unwrap();
        assert_eq!(ranked[0].candidate.trajectory_reference, "A");
        assert_eq!(ranked[1].candidate.trajectory_reference, "B");
    }

    #[test]
    fn ranking_is_a_permutation_sorted_non_increasing() {
        let planner = RolloutPlanner::default();
        let candidates = planner
            .build_candidates(&[proposal("A"), proposal("B"), proposal("C")])
            .unwrap();
        let ranked = planner.rank_candidates(candidates, &HashMap::new()).unwrap();
        assert_eq!(ranked.len(), 3);
        for window in ranked.windows(2) {
            assert!(window[0].ranking_score >= window[1].ranking_score);
        }
    }

    #[test]
    fn ties_are_stable_with_respect_to_input_order() {
        let planner = RolloutPlanner::default();
        let candidates = planner
            .build_candidates(&[proposal("first"), proposal("second")])
            .unwrap();
        let ranked = planner.rank_candidates(candidates, &HashMap::new()).unwrap();
        assert_eq!(ranked[0].candidate.trajectory_reference, "first");
        assert_eq!(ranked[1].candidate.trajectory_reference, "second");
    }

    #[test]
    fn out_of_range_signal_override_is_rejected() {
        let planner = RolloutPlanner::default();
        let candidates = planner.build_candidates(&[proposal("A")]).unwrap();
        let mut overrides = HashMap::new();
        overrides.insert("A".to_string(), RolloutSignals { viability: 1.5, valence: 0.5 });
        let err = planner.rank_candidates(candidates, &overrides).unwrap_err();
        assert!(matches!(err, RolloutError::SignalOutOfRange { .. }));
    }
}
