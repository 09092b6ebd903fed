//! Guarded runtime facade, configuration, and autonomous session runner
//! that tie every pipeline subsystem together into one operator-facing
//! crate (§4.13-§4.15, §2's "data flow for one cycle").

mod config;
mod error;
mod runtime;
mod session;

pub use config::{
    AutonomyConfig, LoggingConfig, RcConfig, RcWeightsConfig, RolloutConfig, RuntimeConfig,
    SandboxConfig, StorageConfig,
};
pub use error::RuntimeError;
pub use runtime::{GuardedRuntime, DEFAULT_PROVIDED_VERIFIERS};
pub use session::{
    AutonomousSessionRunner, SessionResult, SessionStepInput, SessionStepOutcome, StopReason,
};

pub use custodian_rollout::{RolloutCandidate, RolloutEvaluation, RolloutProposal, RolloutSignals};
