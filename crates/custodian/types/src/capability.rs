use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::EffectClass;

/// Immutable capability record keyed by action class (§3, §4.3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub action_class: String,
    pub effect_class: EffectClass,
    pub requires_consent: bool,
    pub allowed_scopes: HashSet<String>,
    pub required_verifiers: HashSet<String>,
    /// Provenance field names that must be present and non-empty for a
    /// request to bind to this capability (§4.4 step 5).
    pub provenance_bindings: HashSet<String>,
}

/// Builder for [`Capability`], used by the manifest loader and by tests.
#[derive(Default)]
pub struct CapabilityBuilder {
    action_class: String,
    effect_class: Option<EffectClass>,
    requires_consent: bool,
    allowed_scopes: HashSet<String>,
    required_verifiers: HashSet<String>,
    provenance_bindings: HashSet<String>,
}

impl CapabilityBuilder {
    pub fn new(action_class: impl Into<String>, effect_class: EffectClass) -> Self {
        Self {
            action_class: action_class.into(),
            effect_class: Some(effect_class),
            ..Default::default()
        }
    }

    pub fn requires_consent(mut self, requires_consent: bool) -> Self {
        self.requires_consent = requires_consent;
        self
    }

    pub fn allowed_scopes(mut self, scopes: impl IntoIterator<Item = String>) -> Self {
        self.allowed_scopes = scopes.into_iter().collect();
        self
    }

    pub fn required_verifiers(mut self, verifiers: impl IntoIterator<Item = String>) -> Self {
        self.required_verifiers = verifiers.into_iter().collect();
        self
    }

    pub fn provenance_bindings(mut self, bindings: impl IntoIterator<Item = String>) -> Self {
        self.provenance_bindings = bindings.into_iter().collect();
        self
    }

    pub fn build(self) -> Capability {
        Capability {
            action_class: self.action_class,
            effect_class: self.effect_class.expect("effect_class set in new()"),
            requires_consent: self.requires_consent,
            allowed_scopes: self.allowed_scopes,
            required_verifiers: self.required_verifiers,
            provenance_bindings: self.provenance_bindings,
        }
    }
}

/// Proof of user consent for one action class + scope pair (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsentToken {
    pub action_class: String,
    pub scope: String,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl ConsentToken {
    pub fn new(action_class: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            action_class: action_class.into(),
            scope: scope.into(),
            nonce: uuid::Uuid::new_v4().to_string(),
            issued_at: Utc::now(),
            expiry: None,
        }
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Valid for a request iff action class and scope match exactly and
    /// (expiry absent or expiry > now).
    pub fn is_valid_for(&self, action_class: &str, scope: &str) -> bool {
        if self.action_class != action_class || self.scope != scope {
            return false;
        }
        match self.expiry {
            Some(expiry) => expiry > Utc::now(),
            None => true,
        }
    }
}
