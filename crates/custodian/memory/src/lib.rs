//! Session memory store: append-only autonomy log, separate from the
//! tamper-evident ledger (§3, §4.11, §9 "do not unify them").

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use custodian_types::SessionMemoryRecord;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionMemoryError {
    #[error("failed to access session memory file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse session memory line: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Append-only JSONL autonomy log (§4.11). Plain observability log; no
/// hash chaining.
pub struct SessionMemoryStore {
    path: PathBuf,
}

impl SessionMemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SessionMemoryError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SessionMemoryError::Io {
                path: path.display().to_string(),
                source,
            })?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SessionMemoryError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts a new session, returning its freshly minted id.
    pub fn start_session(&self) -> Result<String, SessionMemoryError> {
        let session_id = Uuid::new_v4().to_string();
        self.append(SessionMemoryRecord::SessionStarted {
            session_id: session_id.clone(),
            timestamp: Utc::now(),
        })?;
        Ok(session_id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append_step_record(
        &self,
        session_id: &str,
        step_index: usize,
        trajectory_reference: &str,
        action_class: &str,
        scope: &str,
        allowed: bool,
        reason: &str,
    ) -> Result<(), SessionMemoryError> {
        self.append(SessionMemoryRecord::StepRecorded {
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            step_index,
            trajectory_reference: trajectory_reference.to_string(),
            action_class: action_class.to_string(),
            scope: scope.to_string(),
            allowed,
            reason: reason.to_string(),
        })
    }

    pub fn finalize_session(
        &self,
        session_id: &str,
        stopped_reason: &str,
        steps_executed: usize,
    ) -> Result<(), SessionMemoryError> {
        self.append(SessionMemoryRecord::SessionFinished {
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            stopped_reason: stopped_reason.to_string(),
            steps_executed,
        })
    }

    /// Bounded bias in `[-0.05, +0.05]` derived from this trajectory's
    /// history of allowed/denied steps, so history nudges ranking without
    /// overriding live signals (§4.11).
    pub fn trajectory_bias(&self, trajectory_reference: &str) -> Result<f64, SessionMemoryError> {
        let entries = self.read_all()?;
        let (mut successes, mut failures) = (0u64, 0u64);
        for entry in &entries {
            if let SessionMemoryRecord::StepRecorded {
                trajectory_reference: recorded_reference,
                allowed,
                ..
            } = entry
            {
                if recorded_reference == trajectory_reference {
                    if *allowed {
                        successes += 1;
                    } else {
                        failures += 1;
                    }
                }
            }
        }
        let total = successes + failures;
        if total == 0 {
            return Ok(0.0);
        }
        let raw = (successes as f64 - failures as f64) / total as f64 * 0.05;
        Ok(raw.clamp(-0.05, 0.05))
    }

    pub fn read_all(&self) -> Result<Vec<SessionMemoryRecord>, SessionMemoryError> {
        let file = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|source| SessionMemoryError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|source| SessionMemoryError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }

    fn append(&self, record: SessionMemoryRecord) -> Result<(), SessionMemoryError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| SessionMemoryError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        let line = serde_json::to_string(&record)?;
        writeln!(file, "{line}").map_err(|source| SessionMemoryError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        tracing::debug!(session_id = record.session_id(), "session memory append");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trajectory_bias_is_zero_with_no_history() {
        let dir = tempfile::tempdir().unwrap();
        let memory = SessionMemoryStore::new(dir.path().join("memory.jsonl")).unwrap();
        assert_eq!(memory.trajectory_bias("unseen").unwrap(), 0.0);
    }

    #[test]
    fn trajectory_bias_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let memory = SessionMemoryStore::new(dir.path().join("memory.jsonl")).unwrap();
        let session_id = memory.start_session().unwrap();
        for i in 0..10 {
            memory
                .append_step_record(&session_id, i, "traj-a", "WRITE_FILE", "workspace:project", true, "allowed")
                .unwrap();
        }
        let bias = memory.trajectory_bias("traj-a").unwrap();
        assert!((-0.05..=0.05).contains(&bias));
        assert!((bias - 0.05).abs() < 1e-9);
    }

    #[test]
    fn mixed_outcomes_produce_a_proportional_bias() {
        let dir = tempfile::tempdir().unwrap();
        let memory = SessionMemoryStore::new(dir.path().join("memory.jsonl")).unwrap();
        let session_id = memory.start_session().unwrap();
        memory
            .append_step_record(&session_id, 0, "traj-b", "WRITE_FILE", "workspace:project", true, "allowed")
            .unwrap();
        memory
            .append_step_record(&session_id, 1, "traj-b", "WRITE_FILE", "workspace:project", false, "consent_required")
            .unwrap();
        memory
            .append_step_record(&session_id, 2, "traj-b", "WRITE_FILE", "workspace:project", false, "consent_required")
            .unwrap();
        let bias = memory.trajectory_bias("traj-b").unwrap();
        assert!((bias - (-0.05 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn session_lifecycle_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let memory = SessionMemoryStore::new(dir.path().join("memory.jsonl")).unwrap();
        let session_id = memory.start_session().unwrap();
        memory
            .append_step_record(&session_id, 0, "traj-a", "WRITE_FILE", "workspace:project", true, "allowed")
            .unwrap();
        memory.finalize_session(&session_id, "completed", 1).unwrap();
        let entries = memory.read_all().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[0], SessionMemoryRecord::SessionStarted { .. }));
        assert!(matches!(entries[2], SessionMemoryRecord::SessionFinished { .. }));
    }
}
