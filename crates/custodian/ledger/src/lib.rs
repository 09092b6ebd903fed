//! Hash-chained, append-only JSON-lines ledger (§4.7).
//!
//! Owns its file exclusively: created at construction, never truncated,
//! appended-to only. Concurrent runtimes on one ledger file are
//! unsupported (§5, §9 open question 3) — the read-all-then-append idiom
//! below is not atomic across processes, and this type does not attempt
//! file locking.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use custodian_types::LedgerEntry;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to read ledger file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse ledger line: {0}")]
    Parse(#[from] serde_json::Error),
}

const GENESIS: &str = "GENESIS";

/// Append-only ledger backed by a `.jsonl` file (§3, §4.7, §6).
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Creates parent directories and touches the file if absent.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                path: path.display().to_string(),
                source,
            })?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LedgerError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry built from `payload`. Reads all existing entries
    /// to determine the index and previous hash — not atomic across
    /// processes (§5, §9).
    pub fn append(&self, payload: Value) -> Result<LedgerEntry, LedgerError> {
        let entries = self.read_all()?;
        let previous_hash = entries
            .last()
            .map(|entry| entry.entry_hash.clone())
            .unwrap_or_else(|| GENESIS.to_string());
        let index = entries.len() as u64;
        let entry_hash = compute_entry_hash(index, &payload, &previous_hash)?;

        let entry = LedgerEntry {
            index,
            timestamp: Utc::now(),
            payload,
            previous_hash,
            entry_hash,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| LedgerError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        let line = serde_json::to_string(&sorted_entry(&entry)?)?;
        writeln!(file, "{line}").map_err(|source| LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        tracing::info!(index = entry.index, entry_hash = %entry.entry_hash, "ledger append");
        Ok(entry)
    }

    /// Reads all entries in file order.
    pub fn read_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let file = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|source| LedgerError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|source| LedgerError::Io {
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

    /// Recomputes the chain left-to-right, returning `false` on any
    /// index, previous-hash, or hash mismatch — tamper detection is
    /// transitive (§4.7 invariant).
    pub fn verify_chain(&self) -> Result<bool, LedgerError> {
        let entries = self.read_all()?;
        let mut expected_previous_hash = GENESIS.to_string();
        for (index, entry) in entries.iter().enumerate() {
            if entry.index != index as u64 {
                return Ok(false);
            }
            if entry.previous_hash != expected_previous_hash {
                return Ok(false);
            }
            let expected_hash = compute_entry_hash(entry.index, &entry.payload, &entry.previous_hash)?;
            if entry.entry_hash != expected_hash {
                return Ok(false);
            }
            expected_previous_hash = entry.entry_hash.clone();
        }
        Ok(true)
    }
}

/// `entry_hash = SHA256(canonical_json({index, payload, previous_hash}))`,
/// canonical JSON using sorted keys and compact separators (§4.7).
fn compute_entry_hash(index: u64, payload: &Value, previous_hash: &str) -> Result<String, LedgerError> {
    let material = serde_json::json!({
        "index": index,
        "payload": payload,
        "previous_hash": previous_hash,
    });
    let canonical = canonical_json(&material)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex_encode(&hasher.finalize()))
}

/// Re-serializes a value with sorted object keys and compact separators,
/// matching Python's `json.dumps(..., sort_keys=True, separators=(",",
/// ":"))` used by the original implementation.
fn canonical_json(value: &Value) -> Result<String, LedgerError> {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut sorted = serde_json::Map::new();
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for key in keys {
                    sorted.insert(key.clone(), sort(&map[key]));
                }
                Value::Object(sorted)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    Ok(serde_json::to_string(&sort(value))?)
}

/// Serializes an entry with its top-level keys sorted, matching the §6
/// line format.
fn sorted_entry(entry: &LedgerEntry) -> Result<Value, LedgerError> {
    let value = serde_json::to_value(entry)?;
    Ok(value)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
