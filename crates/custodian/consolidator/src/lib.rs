//! Offline consolidator: trigger-gated aggregation of the ledger into a
//! skill-reliability summary (§4.8).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use custodian_ledger::Ledger;
use serde::Serialize;
use thiserror::Error;

const ALLOWED_TRIGGERS: [&str; 2] = ["scheduler", "operator_cli"];

#[derive(Debug, Error)]
pub enum ConsolidatorError {
    #[error("offline consolidation blocked for trigger_source={0:?}")]
    UntrustedTrigger(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] custodian_ledger::LedgerError),

    #[error("failed to write consolidation artifact to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize consolidation artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize)]
struct ActionReliability {
    total_events: u64,
    commit_events: u64,
    success_events: u64,
    success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
struct ConsolidationArtifact {
    generated_at: DateTime<Utc>,
    trigger_source: String,
    processed_entries: u64,
    action_reliability: BTreeMap<String, ActionReliability>,
}

/// Result of one consolidation run.
#[derive(Debug, Clone)]
pub struct ConsolidationResult {
    pub output_path: PathBuf,
    pub processed_entries: u64,
    pub generated_at: DateTime<Utc>,
}

/// Aggregates a ledger into `skill_reliability.json` inside `output_dir`
/// (§4.8, §6). Rejects any trigger source outside `{"scheduler",
/// "operator_cli"}` as a defense against untrusted triggers.
pub struct OfflineConsolidator<'a> {
    ledger: &'a Ledger,
    output_dir: PathBuf,
}

impl<'a> OfflineConsolidator<'a> {
    pub fn new(ledger: &'a Ledger, output_dir: impl Into<PathBuf>) -> Result<Self, ConsolidatorError> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).map_err(|source| ConsolidatorError::Io {
            path: output_dir.display().to_string(),
            source,
        })?;
        Ok(Self { ledger, output_dir })
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join("skill_reliability.json")
    }

    pub fn consolidate(&self, trigger_source: &str) -> Result<ConsolidationResult, ConsolidatorError> {
        if !ALLOWED_TRIGGERS.contains(&trigger_source) {
            tracing::warn!(trigger_source, "offline consolidation blocked: untrusted trigger");
            return Err(ConsolidatorError::UntrustedTrigger(trigger_source.to_string()));
        }

        let entries = self.ledger.read_all()?;
        let action_reliability = build_summary(&entries);
        let generated_at = Utc::now();
        let artifact = ConsolidationArtifact {
            generated_at,
            trigger_source: trigger_source.to_string(),
            processed_entries: entries.len() as u64,
            action_reliability,
        };

        let output_path = self.output_path();
        let serialized = serde_json::to_string_pretty(&artifact)?;
        write_atomically(&output_path, &serialized)?;

        tracing::info!(
            trigger_source,
            processed_entries = entries.len(),
            output = %output_path.display(),
            "offline consolidation complete"
        );

        Ok(ConsolidationResult {
            output_path,
            processed_entries: entries.len() as u64,
            generated_at,
        })
    }
}

fn build_summary(entries: &[custodian_types::LedgerEntry]) -> BTreeMap<String, ActionReliability> {
    let mut summary: BTreeMap<String, ActionReliability> = BTreeMap::new();
    for entry in entries {
        let payload = &entry.payload;
        let action_class = payload
            .get("action_class")
            .and_then(|value| value.as_str())
            .unwrap_or("UNKNOWN_ACTION")
            .to_string();
        let bucket = summary.entry(action_class).or_default();
        bucket.total_events += 1;
        if payload.get("event").and_then(|value| value.as_str()) == Some("commit_executed") {
            bucket.commit_events += 1;
            let returncode = payload
                .get("execution")
                .and_then(|execution| execution.get("returncode"))
                .and_then(|value| value.as_i64());
            if returncode == Some(0) {
                bucket.success_events += 1;
            }
        }
    }
    for bucket in summary.values_mut() {
        bucket.success_rate = if bucket.commit_events == 0 {
            0.0
        } else {
            round4(bucket.success_events as f64 / bucket.commit_events as f64)
        };
    }
    summary
}

fn round4(value: f64) -> f64 {
    (value * 10000.0).round() / 10000.0
}

/// Writes to a sibling temp file then renames into place, matching the
/// original's atomic-replace behavior for the consolidation artifact.
fn write_atomically(path: &Path, contents: &str) -> Result<(), ConsolidatorError> {
    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, contents).map_err(|source| ConsolidatorError::Io {
        path: temp_path.display().to_string(),
        source,
    })?;
    std::fs::rename(&temp_path, path).map_err(|source| ConsolidatorError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodian_ledger::Ledger;

    fn entry(action_class: &str, event: &str, returncode: Option<i64>) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "action_class": action_class,
            "event": event,
        });
        if let Some(code) = returncode {
            payload["execution"] = serde_json::json!({"returncode": code});
        }
        payload
    }

    #[test]
    fn untrusted_trigger_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("ledger.jsonl")).unwrap();
        let consolidator = OfflineConsolidator::new(&ledger, dir.path().join("offline")).unwrap();
        let err = consolidator.consolidate("untrusted_caller").unwrap_err();
        assert!(matches!(err, ConsolidatorError::UntrustedTrigger(_)));
    }

    #[test]
    fn buckets_by_action_class_and_computes_success_rate() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("ledger.jsonl")).unwrap();
        ledger
            .append(entry("WRITE_FILE", "commit_executed", Some(0)))
            .unwrap();
        ledger
            .append(entry("WRITE_FILE", "commit_executed", Some(1)))
            .unwrap();
        ledger
            .append(entry("WRITE_FILE", "proposal_rejected", None))
            .unwrap();
        ledger
            .append(entry("SEND_EMAIL", "proposal_rejected", None))
            .unwrap();

        let consolidator = OfflineConsolidator::new(&ledger, dir.path().join("offline")).unwrap();
        let result = consolidator.consolidate("operator_cli").unwrap();
        assert_eq!(result.processed_entries, 4);

        let artifact: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&result.output_path).unwrap()).unwrap();
        let write_file = &artifact["action_reliability"]["WRITE_FILE"];
        assert_eq!(write_file["total_events"], 3);
        assert_eq!(write_file["commit_events"], 2);
        assert_eq!(write_file["success_events"], 1);
        assert_eq!(write_file["success_rate"], 0.5);

        let send_email = &artifact["action_reliability"]["SEND_EMAIL"];
        assert_eq!(send_email["commit_events"], 0);
        assert_eq!(send_email["success_rate"], 0.0);
    }

    #[test]
    fn defaults_unlabeled_actions_to_unknown_action() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("ledger.jsonl")).unwrap();
        ledger.append(serde_json::json!({"event": "commit_executed"})).unwrap();
        let consolidator = OfflineConsolidator::new(&ledger, dir.path().join("offline")).unwrap();
        let result = consolidator.consolidate("scheduler").unwrap();
        let artifact: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&result.output_path).unwrap()).unwrap();
        assert!(artifact["action_reliability"]["UNKNOWN_ACTION"].is_object());
    }

    #[test]
    fn re_running_over_unchanged_ledger_is_idempotent_modulo_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("ledger.jsonl")).unwrap();
        ledger
            .append(entry("WRITE_FILE", "commit_executed", Some(0)))
            .unwrap();
        let consolidator = OfflineConsolidator::new(&ledger, dir.path().join("offline")).unwrap();
        let first = consolidator.consolidate("operator_cli").unwrap();
        let second = consolidator.consolidate("operator_cli").unwrap();
        let mut a: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&first.output_path).unwrap()).unwrap();
        let mut b: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&second.output_path).unwrap()).unwrap();
        a["generated_at"] = serde_json::Value::Null;
        b["generated_at"] = serde_json::Value::Null;
        assert_eq!(a, b);
    }
}
