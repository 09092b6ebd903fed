use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::capability::ConsentToken;
use crate::envelope::{EffectClass, Envelope, Provenance};
use crate::ledger::LedgerEntry;
use crate::verification::{RcConflictSignals, RcState, VerifierReason, VerifierState};

/// Proof-of-admission minted once per allowed cycle (§3, §4.5). Pure data;
/// minting is a pure-factory operation owned by `custodian-capability`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitToken {
    pub id: Uuid,
    pub action_class: String,
    pub trajectory_reference: Option<String>,
    pub verifier_state: VerifierState,
    pub rc_state_at_mint: RcState,
    pub rc_score_snapshot: f64,
    pub issued_at: DateTime<Utc>,
}

/// The bundled input to one full guarded cycle (§2's data flow, named
/// `ProposalCycleInput` in the original implementation).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleRequest {
    pub action_class: String,
    pub scope: String,
    pub effect_class: EffectClass,
    pub command: Vec<String>,
    pub proposal_type: String,
    pub payload: BTreeMap<String, Value>,
    pub provenance: Provenance,
    /// Explicit conflict-risk score. Takes priority over `rc_signals` when
    /// present; at least one of the two must be supplied (§2, §4.2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rc_score: Option<f64>,
    /// Per-candidate conflict-risk signals the runtime scores via
    /// `custodian_rc::score` when `rc_score` is absent (§2, §4.2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rc_signals: Option<RcConflictSignals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent: Option<ConsentToken>,
    #[serde(default)]
    pub provided_verifiers: HashSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trajectory_reference: Option<String>,
}

/// The result of one full guarded cycle (`ProposalCycleResult` in the
/// original implementation).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub envelope: Envelope,
    pub rc_state: RcState,
    pub rc_score: f64,
    pub reason: VerifierReason,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_token: Option<CommitToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_returncode: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_stderr: Option<String>,
    pub ledger_entry: LedgerEntry,
}
