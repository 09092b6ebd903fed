use thiserror::Error;

/// Validation failures raised while constructing or checking value records.
///
/// These are invalid-argument failures (§7), not verifier decisions — a
/// `VerificationDecision` is returned for policy denials, never raised.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("signal {name} out of range [0,1]: {value}")]
    SignalOutOfRange { name: &'static str, value: String },

    #[error("weights must be non-negative and sum to more than zero")]
    InvalidWeights,

    #[error("typed-boundary violation: source class {source_class} may not write payload type {payload_type}")]
    TypedBoundaryViolation {
        source_class: String,
        payload_type: String,
    },

    #[error("rc score out of range [0,1]: {0}")]
    ScoreOutOfRange(String),

    #[error("threshold invariant violated: expected 0 <= t_low < t_high < t_lock <= 1")]
    InvalidThresholds,
}
