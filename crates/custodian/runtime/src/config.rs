//! Runtime configuration, loaded the way `palm-daemon` loads its daemon
//! config: defaults, then an optional file, then `GUARDIAN__`-prefixed
//! (double-underscore nested) environment overrides (§4.15).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RcWeightsConfig {
    pub provenance_mismatch: f64,
    pub identity_capability_inconsistency: f64,
    pub temporal_discontinuity: f64,
    pub tool_output_inconsistency: f64,
}

impl Default for RcWeightsConfig {
    fn default() -> Self {
        Self {
            provenance_mismatch: 0.25,
            identity_capability_inconsistency: 0.25,
            temporal_discontinuity: 0.25,
            tool_output_inconsistency: 0.25,
        }
    }
}

/// Conflict-risk hysteresis thresholds and strict-mode cutoff (§4.2, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RcConfig {
    pub t_low: f64,
    pub t_high: f64,
    pub t_lock: f64,
    pub rc_high_threshold: f64,
    pub weights: RcWeightsConfig,
}

impl Default for RcConfig {
    fn default() -> Self {
        Self {
            t_low: 0.35,
            t_high: 0.65,
            t_lock: 0.9,
            rc_high_threshold: custodian_capability::DEFAULT_RC_HIGH_THRESHOLD,
            weights: RcWeightsConfig::default(),
        }
    }
}

/// Sandbox execution policy (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    pub root: PathBuf,
    pub allowed_commands: Vec<String>,
    pub default_timeout_seconds: f64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./guardian-state/sandbox"),
            allowed_commands: vec!["echo".to_string()],
            default_timeout_seconds: 5.0,
        }
    }
}

/// File locations for the ledger, audit log, capability manifest, and
/// offline/session-memory output (§4.7-§4.9, §4.11).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub capability_manifest_path: PathBuf,
    pub ledger_path: PathBuf,
    pub audit_log_path: PathBuf,
    pub offline_output_dir: PathBuf,
    pub session_memory_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            capability_manifest_path: PathBuf::from("./guardian-state/capabilities.json"),
            ledger_path: PathBuf::from("./guardian-state/ledger.jsonl"),
            audit_log_path: PathBuf::from("./guardian-state/verifier_audit.jsonl"),
            offline_output_dir: PathBuf::from("./guardian-state/offline"),
            session_memory_path: PathBuf::from("./guardian-state/autonomy/session_memory.jsonl"),
        }
    }
}

/// Rollout ranking weights (§4.10). Default `0.6, 0.4`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RolloutConfig {
    pub viability_weight: f64,
    pub valence_weight: f64,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            viability_weight: 0.6,
            valence_weight: 0.4,
        }
    }
}

/// Autonomous session budget and stop policy (§4.12).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutonomyConfig {
    pub max_steps: usize,
    pub max_command_count: Option<usize>,
    pub max_wall_clock_seconds: Option<f64>,
    pub stop_on_reject: bool,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            max_steps: 5,
            max_command_count: None,
            max_wall_clock_seconds: None,
            stop_on_reject: true,
        }
    }
}

/// Structured-logging configuration (§4.14), consumed by the demo binary's
/// `tracing_subscriber` init.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Top-level runtime configuration (§4.15).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub rc: RcConfig,
    pub sandbox: SandboxConfig,
    pub storage: StorageConfig,
    pub rollout: RolloutConfig,
    pub autonomy: AutonomyConfig,
    pub logging: LoggingConfig,
}

impl RuntimeConfig {
    /// Layers defaults, an optional config file, then `GUARDIAN__`-prefixed
    /// environment variables, matching the `palm-daemon` config idiom. A
    /// double-underscore separator is used between nesting levels so it
    /// doesn't collide with the single underscores already present in field
    /// names like `t_low` or `rc_high_threshold` (e.g.
    /// `GUARDIAN__RC__T_LOW=0.4`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&RuntimeConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("GUARDIAN")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
