use std::collections::HashMap;
use std::path::Path;

use custodian_types::{Capability, EffectClass};
use serde::Deserialize;

use crate::error::CapabilityError;

#[derive(Deserialize)]
struct ManifestDocument {
    capabilities: Vec<ManifestCapability>,
}

#[derive(Deserialize)]
struct ManifestCapability {
    action_class: String,
    effect_class: EffectClass,
    #[serde(default)]
    requires_consent: bool,
    #[serde(default)]
    allowed_scopes: Vec<String>,
    #[serde(default)]
    required_verifiers: Vec<String>,
    #[serde(default)]
    provenance_bindings: Vec<String>,
}

/// Typed capability records loaded from an external JSON document, keyed
/// by action class. Duplicate action classes: last one wins (§6).
#[derive(Clone, Debug, Default)]
pub struct CapabilityManifest {
    capabilities: HashMap<String, Capability>,
}

impl CapabilityManifest {
    pub fn load(path: &Path) -> Result<Self, CapabilityError> {
        let text = std::fs::read_to_string(path).map_err(|source| CapabilityError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, CapabilityError> {
        let document: ManifestDocument = serde_json::from_str(text)?;
        let mut capabilities = HashMap::new();
        for entry in document.capabilities {
            let capability = Capability {
                action_class: entry.action_class.clone(),
                effect_class: entry.effect_class,
                requires_consent: entry.requires_consent,
                allowed_scopes: entry.allowed_scopes.into_iter().collect(),
                required_verifiers: entry.required_verifiers.into_iter().collect(),
                provenance_bindings: entry.provenance_bindings.into_iter().collect(),
            };
            // last one wins on duplicate action classes
            capabilities.insert(entry.action_class, capability);
        }
        tracing::info!(count = capabilities.len(), "loaded capability manifest");
        Ok(Self { capabilities })
    }

    pub fn get(&self, action_class: &str) -> Option<&Capability> {
        self.capabilities.get(action_class)
    }

    pub fn insert(&mut self, capability: Capability) {
        self.capabilities
            .insert(capability.action_class.clone(), capability);
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_action_classes_last_wins() {
        let text = r#"{
            "capabilities": [
                {"action_class": "WRITE_FILE", "effect_class": "reversible", "allowed_scopes": ["a"]},
                {"action_class": "WRITE_FILE", "effect_class": "destructive", "allowed_scopes": ["b"]}
            ]
        }"#;
        let manifest = CapabilityManifest::load_from_str(text).unwrap();
        let capability = manifest.get("WRITE_FILE").unwrap();
        assert_eq!(capability.effect_class, EffectClass::Destructive);
        assert_eq!(capability.allowed_scopes.len(), 1);
        assert!(capability.allowed_scopes.contains("b"));
    }

    #[test]
    fn unknown_action_class_is_absent() {
        let manifest = CapabilityManifest::load_from_str(r#"{"capabilities": []}"#).unwrap();
        assert!(manifest.get("NOPE").is_none());
    }
}
