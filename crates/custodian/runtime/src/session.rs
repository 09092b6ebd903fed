//! Autonomous session runner: multi-step orchestration with budgets and
//! memory-weighted replanning (§4.12).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use custodian_memory::SessionMemoryStore;
use custodian_rollout::{RolloutProposal, RolloutSignals};
use custodian_types::{ConsentToken, CycleRequest, VerifierReason};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AutonomyConfig;
use crate::error::RuntimeError;
use crate::runtime::GuardedRuntime;

/// One step's pool of rollout candidates to choose among, plus the
/// request-level fields shared by whichever candidate is selected (§4.12
/// step 3). Trajectory references must be unique within a step.
#[derive(Debug, Clone, Default)]
pub struct SessionStepInput {
    pub candidates: Vec<RolloutProposal>,
    pub signal_overrides: HashMap<String, RolloutSignals>,
    pub payload: BTreeMap<String, Value>,
    /// Fallback score used only when the selected candidate carries no
    /// per-candidate `rc_signals` of its own (§2, §4.2, §4.12).
    pub rc_score: Option<f64>,
    pub consent: Option<ConsentToken>,
    pub provided_verifiers: HashSet<String>,
}

/// Closed stop-reason taxonomy (§4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    NoCandidates,
    RejectedStep,
    MaxCommandCountReached,
    MaxWallClockReached,
    MaxStepsReached,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::Completed => "completed",
            StopReason::NoCandidates => "no_candidates",
            StopReason::RejectedStep => "rejected_step",
            StopReason::MaxCommandCountReached => "max_command_count_reached",
            StopReason::MaxWallClockReached => "max_wall_clock_reached",
            StopReason::MaxStepsReached => "max_steps_reached",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a single executed step.
#[derive(Debug, Clone)]
pub struct SessionStepOutcome {
    pub step_index: usize,
    pub trajectory_reference: String,
    pub allowed: bool,
    pub reason: VerifierReason,
}

/// Full result of one autonomous session (§4.12).
#[derive(Debug, Clone)]
pub struct SessionResult {
    pub session_id: String,
    pub steps: Vec<SessionStepOutcome>,
    pub stopped_reason: StopReason,
}

/// Orchestrates a multi-step session against one [`GuardedRuntime`],
/// overlaying [`custodian_memory::SessionMemoryStore::trajectory_bias`] on
/// top of live rollout ranking at every step (§4.12).
pub struct AutonomousSessionRunner<'a> {
    runtime: &'a mut GuardedRuntime,
    memory: SessionMemoryStore,
    policy: AutonomyConfig,
}

impl<'a> AutonomousSessionRunner<'a> {
    pub fn new(runtime: &'a mut GuardedRuntime, memory: SessionMemoryStore, policy: AutonomyConfig) -> Self {
        Self {
            runtime,
            memory,
            policy,
        }
    }

    /// Runs the session loop over `steps` (§4.12). Budget checks are
    /// evaluated before each step is attempted; a rejected step stops the
    /// session only when `policy.stop_on_reject` is set. The
    /// `max_steps_reached` override fires only when the loop ran exactly
    /// `max_steps` iterations to completion *and* strictly more steps were
    /// available than `max_steps` (§9 open question 1).
    pub fn run(&mut self, steps: Vec<SessionStepInput>) -> Result<SessionResult, RuntimeError> {
        let session_id = self.memory.start_session()?;
        let start = Instant::now();
        let total_steps = steps.len();
        let loop_len = self.policy.max_steps.min(total_steps);

        let mut executed = 0usize;
        let mut outcomes = Vec::new();
        let mut stopped_reason = StopReason::Completed;

        for (step_index, step) in steps.into_iter().take(loop_len).enumerate() {
            if let Some(max_wall) = self.policy.max_wall_clock_seconds {
                if start.elapsed().as_secs_f64() >= max_wall {
                    stopped_reason = StopReason::MaxWallClockReached;
                    break;
                }
            }
            if let Some(max_commands) = self.policy.max_command_count {
                if executed >= max_commands {
                    stopped_reason = StopReason::MaxCommandCountReached;
                    break;
                }
            }
            if step.candidates.is_empty() {
                stopped_reason = StopReason::NoCandidates;
                break;
            }

            let ranked = self.runtime.plan_rollouts(&step.candidates, &step.signal_overrides)?;
            let scores: HashMap<String, f64> = ranked
                .iter()
                .map(|evaluation| {
                    (
                        evaluation.candidate.trajectory_reference.clone(),
                        evaluation.ranking_score,
                    )
                })
                .collect();

            // Select the argmax of bias-adjusted score, iterating in input
            // order so ties resolve to the first-seen candidate (§4.12
            // step 3, §8).
            let mut selected_index = None;
            let mut best_score = f64::NEG_INFINITY;
            for (index, proposal) in step.candidates.iter().enumerate() {
                let bias = self.memory.trajectory_bias(&proposal.trajectory_reference)?;
                let adjusted = scores
                    .get(&proposal.trajectory_reference)
                    .copied()
                    .unwrap_or(0.0)
                    + bias;
                if adjusted > best_score {
                    best_score = adjusted;
                    selected_index = Some(index);
                }
            }
            let selected_index = selected_index.expect("non-empty candidate list has an argmax");
            let selected = &step.candidates[selected_index];
            let selected_evaluation = ranked
                .iter()
                .find(|evaluation| evaluation.candidate.trajectory_reference == selected.trajectory_reference)
                .expect("selected trajectory reference was ranked");
            let candidate = &selected_evaluation.candidate;

            let request = CycleRequest {
                action_class: candidate.action_class.clone(),
                scope: candidate.scope.clone(),
                effect_class: candidate.effect_class,
                command: candidate.command.clone(),
                proposal_type: candidate.envelope.payload_type.to_string(),
                payload: step.payload.clone(),
                provenance: candidate.envelope.provenance.clone(),
                rc_score: step.rc_score,
                rc_signals: candidate.rc_signals,
                consent: step.consent.clone(),
                provided_verifiers: step.provided_verifiers.clone(),
                trajectory_reference: Some(candidate.trajectory_reference.clone()),
            };

            let outcome = self.runtime.run_cycle(request)?;
            self.memory.append_step_record(
                &session_id,
                step_index,
                &candidate.trajectory_reference,
                &candidate.action_class,
                &candidate.scope,
                outcome.allowed,
                &outcome.reason.to_string(),
            )?;
            executed += 1;

            let allowed = outcome.allowed;
            let reason = outcome.reason;
            outcomes.push(SessionStepOutcome {
                step_index,
                trajectory_reference: candidate.trajectory_reference.clone(),
                allowed,
                reason,
            });

            if !allowed && self.policy.stop_on_reject {
                stopped_reason = StopReason::RejectedStep;
                break;
            }

            if let Some(max_wall) = self.policy.max_wall_clock_seconds {
                if start.elapsed().as_secs_f64() >= max_wall {
                    stopped_reason = StopReason::MaxWallClockReached;
                    break;
                }
            }
        }

        if stopped_reason == StopReason::Completed
            && outcomes.len() == self.policy.max_steps
            && total_steps > self.policy.max_steps
        {
            stopped_reason = StopReason::MaxStepsReached;
        }

        self.memory.finalize_session(&session_id, stopped_reason.as_str(), executed)?;

        Ok(SessionResult {
            session_id,
            steps: outcomes,
            stopped_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use custodian_types::{EffectClass, RcConflictSignals};

    fn test_config(dir: &std::path::Path) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.storage.capability_manifest_path = dir.join("capabilities.json");
        config.storage.ledger_path = dir.join("ledger.jsonl");
        config.storage.audit_log_path = dir.join("audit.jsonl");
        config.storage.offline_output_dir = dir.join("offline");
        config.storage.session_memory_path = dir.join("session_memory.jsonl");
        config.sandbox.root = dir.join("sandbox");
        config.sandbox.allowed_commands = vec!["echo".to_string()];
        config
    }

    fn write_manifest(path: &std::path::Path) {
        std::fs::write(
            path,
            r#"{"capabilities": [
                {"action_class": "WRITE_FILE", "effect_class": "reversible", "allowed_scopes": ["workspace:project"]}
            ]}"#,
        )
        .unwrap();
    }

    fn step(trajectory_reference: &str) -> SessionStepInput {
        SessionStepInput {
            candidates: vec![RolloutProposal::new(
                "do it",
                "WRITE_FILE",
                "workspace:project",
                EffectClass::Reversible,
                vec!["echo".to_string(), "step".to_string()],
                trajectory_reference,
            )
            .with_input_provenance(vec!["user-msg".to_string()])],
            signal_overrides: HashMap::new(),
            payload: BTreeMap::new(),
            rc_score: Some(0.1),
            consent: None,
            provided_verifiers: HashSet::new(),
        }
    }

    #[test]
    fn two_steps_complete_normally() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(&dir.path().join("capabilities.json"));
        let config = test_config(dir.path());
        let mut runtime = GuardedRuntime::new(&config).unwrap();
        let memory = SessionMemoryStore::new(&config.storage.session_memory_path).unwrap();
        let mut runner = AutonomousSessionRunner::new(&mut runtime, memory, config.autonomy.clone());
        let result = runner.run(vec![step("a"), step("b")]).unwrap();
        assert_eq!(result.stopped_reason, StopReason::Completed);
        assert_eq!(result.steps.len(), 2);
        assert!(result.steps.iter().all(|s| s.allowed));
    }

    #[test]
    fn max_command_count_budget_stops_the_session() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(&dir.path().join("capabilities.json"));
        let mut config = test_config(dir.path());
        config.autonomy.max_command_count = Some(1);
        let mut runtime = GuardedRuntime::new(&config).unwrap();
        let memory = SessionMemoryStore::new(&config.storage.session_memory_path).unwrap();
        let mut runner = AutonomousSessionRunner::new(&mut runtime, memory, config.autonomy.clone());
        let result = runner.run(vec![step("a"), step("b")]).unwrap();
        assert_eq!(result.stopped_reason, StopReason::MaxCommandCountReached);
        assert_eq!(result.steps.len(), 1);
    }

    #[test]
    fn no_candidates_stops_the_session() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(&dir.path().join("capabilities.json"));
        let config = test_config(dir.path());
        let mut runtime = GuardedRuntime::new(&config).unwrap();
        let memory = SessionMemoryStore::new(&config.storage.session_memory_path).unwrap();
        let mut runner = AutonomousSessionRunner::new(&mut runtime, memory, config.autonomy.clone());
        let mut empty_step = step("a");
        empty_step.candidates.clear();
        let result = runner.run(vec![empty_step]).unwrap();
        assert_eq!(result.stopped_reason, StopReason::NoCandidates);
        assert!(result.steps.is_empty());
    }

    #[test]
    fn max_steps_reached_overrides_completed_only_when_more_steps_remained() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(&dir.path().join("capabilities.json"));
        let mut config = test_config(dir.path());
        config.autonomy.max_steps = 1;
        let mut runtime = GuardedRuntime::new(&config).unwrap();
        let memory = SessionMemoryStore::new(&config.storage.session_memory_path).unwrap();
        let mut runner = AutonomousSessionRunner::new(&mut runtime, memory, config.autonomy.clone());
        let result = runner.run(vec![step("a"), step("b")]).unwrap();
        assert_eq!(result.stopped_reason, StopReason::MaxStepsReached);
        assert_eq!(result.steps.len(), 1);
    }

    #[test]
    fn completed_stays_completed_when_input_does_not_exceed_max_steps() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(&dir.path().join("capabilities.json"));
        let mut config = test_config(dir.path());
        config.autonomy.max_steps = 5;
        let mut runtime = GuardedRuntime::new(&config).unwrap();
        let memory = SessionMemoryStore::new(&config.storage.session_memory_path).unwrap();
        let mut runner = AutonomousSessionRunner::new(&mut runtime, memory, config.autonomy.clone());
        let result = runner.run(vec![step("a"), step("b")]).unwrap();
        assert_eq!(result.stopped_reason, StopReason::Completed);
    }

    #[test]
    fn rejected_step_stops_when_policy_says_so() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("capabilities.json"),
            r#"{"capabilities": [
                {"action_class": "SEND_EMAIL", "effect_class": "privileged", "requires_consent": true, "allowed_scopes": ["mailbox:primary"]}
            ]}"#,
        )
        .unwrap();
        let mut config = test_config(dir.path());
        config.sandbox.allowed_commands = vec!["echo".to_string()];
        config.autonomy.stop_on_reject = true;
        let mut runtime = GuardedRuntime::new(&config).unwrap();
        let memory = SessionMemoryStore::new(&config.storage.session_memory_path).unwrap();
        let mut runner = AutonomousSessionRunner::new(&mut runtime, memory, config.autonomy.clone());
        let mut denied_step = step("a");
        denied_step.candidates[0] = RolloutProposal::new(
            "send it",
            "SEND_EMAIL",
            "mailbox:primary",
            EffectClass::Privileged,
            vec!["echo".to_string(), "sent".to_string()],
            "a",
        )
        .with_input_provenance(vec!["user-msg".to_string()]);
        let result = runner.run(vec![denied_step, step("b")]).unwrap();
        assert_eq!(result.stopped_reason, StopReason::RejectedStep);
        assert_eq!(result.steps.len(), 1);
        assert!(!result.steps[0].allowed);
    }

    #[test]
    fn per_candidate_rc_signals_drive_distinct_conflict_scores() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("capabilities.json"),
            r#"{"capabilities": [
                {"action_class": "DELETE_ALL", "effect_class": "destructive", "allowed_scopes": ["workspace:project"]}
            ]}"#,
        )
        .unwrap();
        let config = test_config(dir.path());
        let mut runtime = GuardedRuntime::new(&config).unwrap();
        let memory = SessionMemoryStore::new(&config.storage.session_memory_path).unwrap();
        let mut runner = AutonomousSessionRunner::new(&mut runtime, memory, config.autonomy.clone());

        let mut high_conflict_step = step("a");
        high_conflict_step.rc_score = None;
        high_conflict_step.candidates[0] = RolloutProposal::new(
            "delete it",
            "DELETE_ALL",
            "workspace:project",
            EffectClass::Destructive,
            vec!["echo".to_string(), "deleted".to_string()],
            "a",
        )
        .with_input_provenance(vec!["user-msg".to_string()])
        .with_rc_signals(RcConflictSignals::new(0.95, 0.95, 0.95, 0.95).unwrap());

        let result = runner.run(vec![high_conflict_step]).unwrap();
        // A candidate carrying high conflict signals alone (no shared
        // step-level rc_score) should still drive lockdown and be denied.
        assert_eq!(result.steps.len(), 1);
        assert!(!result.steps[0].allowed);
        assert_eq!(result.steps[0].reason, VerifierReason::LockdownPostureBlock);
    }
}
