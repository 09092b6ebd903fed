use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::capability::ConsentToken;
use crate::envelope::{EffectClass, Provenance};
use crate::error::TypesError;

/// Four conflict-risk signals, each a real in `[0,1]` (§3).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RcConflictSignals {
    pub provenance_mismatch: f64,
    pub identity_capability_inconsistency: f64,
    pub temporal_discontinuity: f64,
    pub tool_output_inconsistency: f64,
}

impl RcConflictSignals {
    pub fn new(
        provenance_mismatch: f64,
        identity_capability_inconsistency: f64,
        temporal_discontinuity: f64,
        tool_output_inconsistency: f64,
    ) -> Result<Self, TypesError> {
        let signals = Self {
            provenance_mismatch,
            identity_capability_inconsistency,
            temporal_discontinuity,
            tool_output_inconsistency,
        };
        signals.validate()?;
        Ok(signals)
    }

    fn validate(&self) -> Result<(), TypesError> {
        for (name, value) in self.as_named_pairs() {
            if !(0.0..=1.0).contains(&value) {
                return Err(TypesError::SignalOutOfRange {
                    name,
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    fn as_named_pairs(&self) -> [(&'static str, f64); 4] {
        [
            ("provenance_mismatch", self.provenance_mismatch),
            (
                "identity_capability_inconsistency",
                self.identity_capability_inconsistency,
            ),
            ("temporal_discontinuity", self.temporal_discontinuity),
            (
                "tool_output_inconsistency",
                self.tool_output_inconsistency,
            ),
        ]
    }

    pub(crate) fn weighted(&self) -> [f64; 4] {
        [
            self.provenance_mismatch,
            self.identity_capability_inconsistency,
            self.temporal_discontinuity,
            self.tool_output_inconsistency,
        ]
    }
}

/// Four non-negative weights summing to more than zero (§3).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RcConflictWeights {
    pub provenance_mismatch: f64,
    pub identity_capability_inconsistency: f64,
    pub temporal_discontinuity: f64,
    pub tool_output_inconsistency: f64,
}

impl RcConflictWeights {
    pub fn new(
        provenance_mismatch: f64,
        identity_capability_inconsistency: f64,
        temporal_discontinuity: f64,
        tool_output_inconsistency: f64,
    ) -> Result<Self, TypesError> {
        let weights = Self {
            provenance_mismatch,
            identity_capability_inconsistency,
            temporal_discontinuity,
            tool_output_inconsistency,
        };
        weights.validate()?;
        Ok(weights)
    }

    fn validate(&self) -> Result<(), TypesError> {
        let values = self.weighted();
        if values.iter().any(|v| *v < 0.0) || values.iter().sum::<f64>() <= 0.0 {
            return Err(TypesError::InvalidWeights);
        }
        Ok(())
    }

    pub(crate) fn weighted(&self) -> [f64; 4] {
        [
            self.provenance_mismatch,
            self.identity_capability_inconsistency,
            self.temporal_discontinuity,
            self.tool_output_inconsistency,
        ]
    }
}

impl Default for RcConflictWeights {
    /// Equal weighting, matching the default posture in the absence of an
    /// operator-supplied weighting.
    fn default() -> Self {
        Self {
            provenance_mismatch: 0.25,
            identity_capability_inconsistency: 0.25,
            temporal_discontinuity: 0.25,
            tool_output_inconsistency: 0.25,
        }
    }
}

/// Three-state conflict-risk posture (§3, §4.2). Single-instance-per-
/// runtime; mutated only by the hysteresis update operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RcState {
    Normal,
    Verify,
    Lockdown,
}

impl Default for RcState {
    fn default() -> Self {
        RcState::Normal
    }
}

impl std::fmt::Display for RcState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RcState::Normal => "NORMAL",
            RcState::Verify => "VERIFY",
            RcState::Lockdown => "LOCKDOWN",
        };
        write!(f, "{s}")
    }
}

/// Whether the verifier is operating under baseline or strict-mode rules
/// (§4.4 step 6), captured on a minted commit token (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifierState {
    Strict,
    Baseline,
}

/// Input to a verification decision (§4.4).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub action_class: String,
    pub scope: String,
    pub effect_class: EffectClass,
    pub rc_state: RcState,
    pub rc_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent: Option<ConsentToken>,
    pub provenance: Provenance,
    pub provided_verifiers: HashSet<String>,
}

/// Closed reason set for verification decisions (§4.4, §7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifierReason {
    UnknownActionClass,
    EffectClassMismatch,
    ScopeNotAllowed,
    RequiredVerifierMissing,
    ProvenanceBindingMissing,
    LockdownPostureBlock,
    ConsentRequired,
    DestructiveBlockedInStrictMode,
    Allowed,
}

impl std::fmt::Display for VerifierReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VerifierReason::UnknownActionClass => "unknown_action_class",
            VerifierReason::EffectClassMismatch => "effect_class_mismatch",
            VerifierReason::ScopeNotAllowed => "scope_not_allowed",
            VerifierReason::RequiredVerifierMissing => "required_verifier_missing",
            VerifierReason::ProvenanceBindingMissing => "provenance_binding_missing",
            VerifierReason::LockdownPostureBlock => "lockdown_posture_block",
            VerifierReason::ConsentRequired => "consent_required",
            VerifierReason::DestructiveBlockedInStrictMode => "destructive_blocked_in_strict_mode",
            VerifierReason::Allowed => "allowed",
        };
        write!(f, "{s}")
    }
}

/// Output of a verification decision (§4.4). The verifier never raises for
/// policy decisions; it always returns one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationDecision {
    pub allowed: bool,
    pub reason: VerifierReason,
    pub requires_consent: bool,
    pub strict_mode: bool,
}
