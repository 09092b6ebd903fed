//! Guarded runtime facade: the single entry point that wires routing, RC
//! scoring, admission, execution, and ledgering into one cycle (§4.13).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use custodian_capability::{CapabilityManifest, CapabilityVerifier};
use custodian_consolidator::{ConsolidationResult, OfflineConsolidator};
use custodian_ledger::Ledger;
use custodian_rc::RcHysteresis;
use custodian_rollout::{RolloutCandidate, RolloutEvaluation, RolloutPlanner, RolloutProposal, RolloutSignals, RolloutWeights};
use custodian_sandbox::{SandboxExecutor, SandboxPolicy};
use custodian_types::{
    CycleOutcome, CycleRequest, Envelope, ExecutionResult as LedgerExecutionResult, LedgerPayload,
    PayloadType, RcConflictWeights, VerificationRequest, VerifierReason, VerifierState,
};

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;

/// The verifier labels this runtime actually implements (§4.3's note that
/// `required_verifiers` names a label set, not a plugin chain). Substituted
/// in whenever a caller leaves `CycleRequest.provided_verifiers` empty.
pub const DEFAULT_PROVIDED_VERIFIERS: [&str; 4] = [
    "scope_verifier",
    "consent_verifier",
    "destructive_action_verifier",
    "provenance_verifier",
];

fn default_provided_verifiers() -> std::collections::HashSet<String> {
    DEFAULT_PROVIDED_VERIFIERS.iter().map(|label| label.to_string()).collect()
}

fn parse_payload_type(proposal_type: &str) -> Result<PayloadType, RuntimeError> {
    match proposal_type {
        "OBS" => Ok(PayloadType::Obs),
        "INS" => Ok(PayloadType::Ins),
        "TRAJ" => Ok(PayloadType::Traj),
        "POL" => Ok(PayloadType::Pol),
        "ID" => Ok(PayloadType::Id),
        "CAPS" => Ok(PayloadType::Caps),
        other => Err(RuntimeError::UnknownPayloadType(other.to_string())),
    }
}

/// Owns every guarded-pipeline component for one operator-facing runtime
/// instance (§2, §4.13). Single-threaded and synchronous by design (§5):
/// callers needing concurrency serialize their own access.
pub struct GuardedRuntime {
    verifier: CapabilityVerifier,
    rc: RcHysteresis,
    rc_weights: RcConflictWeights,
    sandbox: SandboxExecutor,
    ledger: Ledger,
    rollout_planner: RolloutPlanner,
    offline_output_dir: PathBuf,
}

impl GuardedRuntime {
    /// Builds every component from a loaded [`RuntimeConfig`] (§4.15).
    pub fn new(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let manifest = if config.storage.capability_manifest_path.exists() {
            CapabilityManifest::load(&config.storage.capability_manifest_path)?
        } else {
            CapabilityManifest::default()
        };

        let verifier = CapabilityVerifier::new(manifest)
            .with_rc_high_threshold(config.rc.rc_high_threshold)
            .with_audit_path(&config.storage.audit_log_path)?;

        let rc = RcHysteresis::with_thresholds(config.rc.t_low, config.rc.t_high, config.rc.t_lock)?;
        let rc_weights = RcConflictWeights::new(
            config.rc.weights.provenance_mismatch,
            config.rc.weights.identity_capability_inconsistency,
            config.rc.weights.temporal_discontinuity,
            config.rc.weights.tool_output_inconsistency,
        )?;

        let sandbox_policy = SandboxPolicy::new(config.sandbox.allowed_commands.clone())
            .with_default_timeout(Duration::from_secs_f64(config.sandbox.default_timeout_seconds));
        let sandbox = SandboxExecutor::new(&config.sandbox.root, sandbox_policy)?;

        let ledger = Ledger::new(&config.storage.ledger_path)?;

        let rollout_planner = RolloutPlanner::new(RolloutWeights::new(
            config.rollout.viability_weight,
            config.rollout.valence_weight,
        )?);

        Ok(Self {
            verifier,
            rc,
            rc_weights,
            sandbox,
            ledger,
            rollout_planner,
            offline_output_dir: config.storage.offline_output_dir.clone(),
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Runs one full guarded cycle: reconstructs the routed envelope,
    /// updates RC posture, verifies admission, then either records a
    /// rejection or mints a commit token and executes (§4.13,
    /// `ProposalCycleInput`/`ProposalCycleResult` in the original
    /// implementation).
    pub fn run_cycle(&mut self, request: CycleRequest) -> Result<CycleOutcome, RuntimeError> {
        if request.command.is_empty() {
            return Err(RuntimeError::EmptyCommand);
        }

        let payload_type = parse_payload_type(&request.proposal_type)?;
        let envelope = Envelope::new(
            payload_type,
            request.payload.clone(),
            request.provenance.clone(),
            request.effect_class,
        )?;

        let rc_score = match (request.rc_score, &request.rc_signals) {
            (Some(score), _) => score,
            (None, Some(signals)) => custodian_rc::score(signals, &self.rc_weights),
            (None, None) => return Err(RuntimeError::MissingRcScore),
        };
        let rc_state = self.rc.update(rc_score)?;

        let provided_verifiers = if request.provided_verifiers.is_empty() {
            default_provided_verifiers()
        } else {
            request.provided_verifiers.clone()
        };

        let verification_request = VerificationRequest {
            action_class: request.action_class.clone(),
            scope: request.scope.clone(),
            effect_class: request.effect_class,
            rc_state,
            rc_score,
            consent: request.consent.clone(),
            provenance: request.provenance.clone(),
            provided_verifiers,
        };
        let decision = self.verifier.verify(&verification_request)?;

        if !decision.allowed {
            let payload = LedgerPayload::ProposalRejected {
                action_class: request.action_class.clone(),
                scope: request.scope.clone(),
                effect_class: request.effect_class,
                rc_state,
                rc_conflict_score: rc_score,
                reason: decision.reason.to_string(),
                proposal_type: envelope.payload_type.to_string(),
            };
            let ledger_entry = self.ledger.append(serde_json::to_value(&payload)?)?;
            return Ok(CycleOutcome {
                envelope,
                rc_state,
                rc_score,
                reason: decision.reason,
                allowed: false,
                commit_token: None,
                execution_returncode: None,
                execution_stdout: None,
                execution_stderr: None,
                ledger_entry,
            });
        }

        let verifier_state = if decision.strict_mode {
            VerifierState::Strict
        } else {
            VerifierState::Baseline
        };
        let commit_token = custodian_capability::mint_commit_token(
            request.action_class.clone(),
            request.trajectory_reference.clone(),
            verifier_state,
            rc_state,
            rc_score,
        );

        let execution = self.sandbox.run(&request.command, None)?;
        let ledger_execution = LedgerExecutionResult {
            returncode: execution.returncode,
            stdout: execution.stdout.clone(),
            stderr: execution.stderr.clone(),
        };
        let payload = LedgerPayload::CommitExecuted {
            commit_id: commit_token.id.to_string(),
            action_class: request.action_class.clone(),
            scope: request.scope.clone(),
            effect_class: request.effect_class,
            rc_state,
            rc_conflict_score: rc_score,
            verifier_state,
            command: request.command.clone(),
            execution: ledger_execution,
        };
        let ledger_entry = self.ledger.append(serde_json::to_value(&payload)?)?;

        Ok(CycleOutcome {
            envelope,
            rc_state,
            rc_score,
            reason: VerifierReason::Allowed,
            allowed: true,
            commit_token: Some(commit_token),
            execution_returncode: Some(execution.returncode),
            execution_stdout: Some(execution.stdout),
            execution_stderr: Some(execution.stderr),
            ledger_entry,
        })
    }

    /// Builds and ranks rollout candidates without executing anything or
    /// touching the ledger (§4.10).
    pub fn plan_rollouts(
        &self,
        proposals: &[RolloutProposal],
        signal_overrides: &HashMap<String, RolloutSignals>,
    ) -> Result<Vec<RolloutEvaluation>, RuntimeError> {
        let candidates: Vec<RolloutCandidate> = self.rollout_planner.build_candidates(proposals)?;
        Ok(self.rollout_planner.rank_candidates(candidates, signal_overrides)?)
    }

    /// Runs offline consolidation, rejecting any trigger source outside
    /// `{"scheduler", "operator_cli"}` (§4.8).
    pub fn run_offline_consolidation(
        &self,
        trigger_source: &str,
    ) -> Result<ConsolidationResult, RuntimeError> {
        let consolidator = OfflineConsolidator::new(&self.ledger, &self.offline_output_dir)?;
        Ok(consolidator.consolidate(trigger_source)?)
    }
}
