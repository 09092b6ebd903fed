//! Typed boundary router (§4.1).
//!
//! The single choke point that guarantees model output cannot masquerade
//! as policy or identity data. Downgrading `policy_draft` to `INS` is a
//! deliberate defense against capability-manipulation attacks in model
//! text — it is never generalized away.

use std::collections::BTreeMap;

use custodian_types::{EffectClass, Envelope, PayloadType, Provenance, SourceClass};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("unknown model-output role: {0}")]
    UnknownRole(String),

    #[error("typed-boundary violation: source class {source_class} may not write payload type {payload_type}")]
    TypedBoundaryViolation {
        source_class: String,
        payload_type: String,
    },
}

/// Role-to-payload-type mapping is fixed (§4.1); `policy_draft` is
/// deliberately downgraded to `INS`, never `POL`.
fn role_to_payload_type(role: &str) -> Result<PayloadType, RouterError> {
    match role {
        "interpretation" => Ok(PayloadType::Obs),
        "rollout" => Ok(PayloadType::Traj),
        "execution_suggestion" => Ok(PayloadType::Ins),
        "policy_draft" => Ok(PayloadType::Ins),
        other => Err(RouterError::UnknownRole(other.to_string())),
    }
}

/// The default trusted-source set is `{"trusted_internal"}`.
fn is_trusted_source(source_class: SourceClass) -> bool {
    source_class.is_trusted()
}

/// Fails with a typed-boundary error if `source_class` is not trusted and
/// `payload_type` is in the trusted-store set (§4.1).
pub fn assert_may_write(
    source_class: SourceClass,
    payload_type: PayloadType,
) -> Result<(), RouterError> {
    if payload_type.is_trusted_store_type() && !is_trusted_source(source_class) {
        tracing::warn!(
            %source_class,
            %payload_type,
            "rejected write: untrusted source into trusted-store payload type"
        );
        return Err(RouterError::TypedBoundaryViolation {
            source_class: source_class.to_string(),
            payload_type: payload_type.to_string(),
        });
    }
    Ok(())
}

/// Classifies a user-authored message. Payload type is `OBS` when
/// `as_observation` else `INS`; source class is always `USER`.
pub fn route_user_message(
    text: &str,
    as_observation: bool,
    source_id: &str,
) -> Result<Envelope, RouterError> {
    let payload_type = if as_observation {
        PayloadType::Obs
    } else {
        PayloadType::Ins
    };
    assert_may_write(SourceClass::User, payload_type)?;

    let mut payload = BTreeMap::new();
    payload.insert("text".to_string(), serde_json::Value::String(text.to_string()));

    let provenance = Provenance::new(SourceClass::User, source_id);
    tracing::debug!(payload_type = %payload_type, source_id, "routed user message");
    Envelope::new(payload_type, payload, provenance, EffectClass::None)
        .map_err(|_| RouterError::TypedBoundaryViolation {
            source_class: SourceClass::User.to_string(),
            payload_type: payload_type.to_string(),
        })
}

/// Classifies a model-produced output by declared role (§4.1). The
/// proposed effect class is attached to the envelope for later verifier
/// inspection; the router does not decide admissibility.
#[allow(clippy::too_many_arguments)]
pub fn route_llm_output(
    content: &str,
    role: &str,
    model_call_id: Option<&str>,
    prompt_hash: Option<&str>,
    input_provenance: Vec<String>,
    proposed_effect_class: EffectClass,
) -> Result<Envelope, RouterError> {
    let payload_type = role_to_payload_type(role)?;
    assert_may_write(SourceClass::ModelInternal, payload_type)?;

    let mut payload = BTreeMap::new();
    payload.insert(
        "content".to_string(),
        serde_json::Value::String(content.to_string()),
    );

    let mut provenance = Provenance::new(SourceClass::ModelInternal, "model")
        .with_input_provenance(input_provenance);
    if let Some(model_call_id) = model_call_id {
        provenance = provenance.with_model_call_id(model_call_id);
    }
    if let Some(prompt_hash) = prompt_hash {
        provenance = provenance.with_prompt_hash(prompt_hash);
    }

    tracing::debug!(role, payload_type = %payload_type, "routed model output");
    Envelope::new(payload_type, payload, provenance, proposed_effect_class)
        .map_err(|_| RouterError::TypedBoundaryViolation {
            source_class: SourceClass::ModelInternal.to_string(),
            payload_type: payload_type.to_string(),
        })
}
