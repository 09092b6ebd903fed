use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypesError;
use crate::trusted_store_types;

/// Closed payload-type taxonomy (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PayloadType {
    /// Observation.
    Obs,
    /// Instruction.
    Ins,
    /// Trajectory / rollout.
    Traj,
    /// Policy.
    Pol,
    /// Identity.
    Id,
    /// Capabilities.
    Caps,
}

impl PayloadType {
    /// Whether this payload type belongs to the trusted-store set
    /// `{POL, ID, CAPS}` — only an internally-trusted source may produce it.
    pub fn is_trusted_store_type(self) -> bool {
        trusted_store_types().contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PayloadType::Obs => "OBS",
            PayloadType::Ins => "INS",
            PayloadType::Traj => "TRAJ",
            PayloadType::Pol => "POL",
            PayloadType::Id => "ID",
            PayloadType::Caps => "CAPS",
        }
    }
}

impl std::fmt::Display for PayloadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Effect-class severity, totally ordered: `none < reversible < privileged
/// < destructive`. Declaration order drives the derived `Ord`/`PartialOrd`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectClass {
    None,
    Reversible,
    Privileged,
    Destructive,
}

impl std::fmt::Display for EffectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EffectClass::None => "none",
            EffectClass::Reversible => "reversible",
            EffectClass::Privileged => "privileged",
            EffectClass::Destructive => "destructive",
        };
        write!(f, "{s}")
    }
}

/// Originating source class of a provenance record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceClass {
    User,
    ModelInternal,
    TrustedInternal,
}

impl SourceClass {
    /// The default trusted-source set is `{"trusted_internal"}` (§4.1).
    pub fn is_trusted(self) -> bool {
        matches!(self, SourceClass::TrustedInternal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceClass::User => "USER",
            SourceClass::ModelInternal => "MODEL_INTERNAL",
            SourceClass::TrustedInternal => "trusted_internal",
        }
    }
}

impl std::fmt::Display for SourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable provenance record (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_class: SourceClass,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_hash: Option<String>,
    /// Ordered sequence of upstream provenance identifiers.
    #[serde(default)]
    pub input_provenance: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Provenance {
    pub fn new(source_class: SourceClass, source_id: impl Into<String>) -> Self {
        Self {
            source_class,
            source_id: source_id.into(),
            model_call_id: None,
            prompt_hash: None,
            input_provenance: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_input_provenance(mut self, input_provenance: Vec<String>) -> Self {
        self.input_provenance = input_provenance;
        self
    }

    pub fn with_model_call_id(mut self, model_call_id: impl Into<String>) -> Self {
        self.model_call_id = Some(model_call_id.into());
        self
    }

    pub fn with_prompt_hash(mut self, prompt_hash: impl Into<String>) -> Self {
        self.prompt_hash = Some(prompt_hash.into());
        self
    }
}

/// Immutable typed, provenanced message unit at the trust boundary (§3).
///
/// Invariant: if `payload_type` is in the trusted-store set, `provenance`'s
/// source class must be internally-trusted. [`Envelope::new`] enforces
/// this at construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub payload_type: PayloadType,
    pub payload: BTreeMap<String, Value>,
    pub provenance: Provenance,
    pub effect_class: EffectClass,
}

impl Envelope {
    pub fn new(
        payload_type: PayloadType,
        payload: BTreeMap<String, Value>,
        provenance: Provenance,
        effect_class: EffectClass,
    ) -> Result<Self, TypesError> {
        if payload_type.is_trusted_store_type() && !provenance.source_class.is_trusted() {
            return Err(TypesError::TypedBoundaryViolation {
                source_class: provenance.source_class.to_string(),
                payload_type: payload_type.to_string(),
            });
        }
        Ok(Self {
            payload_type,
            payload,
            provenance,
            effect_class,
        })
    }
}
