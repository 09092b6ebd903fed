use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of the session memory JSONL log (§4.11, §6). A plain
/// observability log, separate from the tamper-evident ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum SessionMemoryRecord {
    #[serde(rename = "session_started")]
    SessionStarted {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "step_recorded")]
    StepRecorded {
        session_id: String,
        timestamp: DateTime<Utc>,
        step_index: usize,
        trajectory_reference: String,
        action_class: String,
        scope: String,
        allowed: bool,
        reason: String,
    },
    #[serde(rename = "session_finished")]
    SessionFinished {
        session_id: String,
        timestamp: DateTime<Utc>,
        stopped_reason: String,
        steps_executed: usize,
    },
}

impl SessionMemoryRecord {
    pub fn session_id(&self) -> &str {
        match self {
            SessionMemoryRecord::SessionStarted { session_id, .. }
            | SessionMemoryRecord::StepRecorded { session_id, .. }
            | SessionMemoryRecord::SessionFinished { session_id, .. } => session_id,
        }
    }
}
