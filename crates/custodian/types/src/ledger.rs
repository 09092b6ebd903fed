use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::EffectClass;
use crate::verification::{RcState, VerifierState};

/// One hash-chained ledger line (§3, §4.7, §6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub previous_hash: String,
    pub entry_hash: String,
}

/// Execution outcome captured on a `commit_executed` ledger payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

/// The two ledger payload shapes named in §6, tagged by `event`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum LedgerPayload {
    #[serde(rename = "proposal_rejected")]
    ProposalRejected {
        action_class: String,
        scope: String,
        effect_class: EffectClass,
        rc_state: RcState,
        rc_conflict_score: f64,
        reason: String,
        proposal_type: String,
    },
    #[serde(rename = "commit_executed")]
    CommitExecuted {
        commit_id: String,
        action_class: String,
        scope: String,
        effect_class: EffectClass,
        rc_state: RcState,
        rc_conflict_score: f64,
        verifier_state: VerifierState,
        command: Vec<String>,
        execution: ExecutionResult,
    },
}
