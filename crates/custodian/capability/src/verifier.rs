use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use custodian_types::{EffectClass, RcState, VerificationDecision, VerificationRequest, VerifierReason};
use serde::Serialize;

use crate::error::CapabilityError;
use crate::manifest::CapabilityManifest;

/// Default threshold above which strict-mode is in effect (§4.4 step 6).
pub const DEFAULT_RC_HIGH_THRESHOLD: f64 = 0.65;

/// Admission decision from request + capability + posture (§4.4).
///
/// The decision pipeline is a fixed sequence, applied in order with first
/// match wins. Its order is contract; it is never generalized into a
/// plugin chain (§9).
pub struct CapabilityVerifier {
    manifest: CapabilityManifest,
    rc_high_threshold: f64,
    audit_path: Option<PathBuf>,
}

#[derive(Serialize)]
struct AuditRequest<'a> {
    action_class: &'a str,
    scope: &'a str,
    effect_class: EffectClass,
    rc_state: RcState,
    rc_conflict_score: f64,
}

#[derive(Serialize)]
struct AuditDecision {
    allowed: bool,
    reason: String,
    requires_consent: bool,
    strict_mode: bool,
}

#[derive(Serialize)]
struct AuditLine<'a> {
    timestamp: chrono::DateTime<Utc>,
    request: AuditRequest<'a>,
    decision: AuditDecision,
}

impl CapabilityVerifier {
    pub fn new(manifest: CapabilityManifest) -> Self {
        Self {
            manifest,
            rc_high_threshold: DEFAULT_RC_HIGH_THRESHOLD,
            audit_path: None,
        }
    }

    pub fn with_rc_high_threshold(mut self, threshold: f64) -> Self {
        self.rc_high_threshold = threshold;
        self
    }

    pub fn with_audit_path(mut self, path: impl Into<PathBuf>) -> Result<Self, CapabilityError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CapabilityError::Io {
                path: path.display().to_string(),
                source,
            })?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| CapabilityError::Io {
                path: path.display().to_string(),
                source,
            })?;
        self.audit_path = Some(path);
        Ok(self)
    }

    /// Runs the fixed-order, 11-step decision pipeline (§4.4).
    pub fn verify(&self, request: &VerificationRequest) -> Result<VerificationDecision, CapabilityError> {
        let decision = self.decide(request);
        if let Some(path) = &self.audit_path {
            self.append_audit_line(path, request, &decision)?;
        }
        tracing::info!(
            action_class = %request.action_class,
            allowed = decision.allowed,
            reason = %decision.reason,
            "verification decision"
        );
        Ok(decision)
    }

    fn decide(&self, request: &VerificationRequest) -> VerificationDecision {
        let deny = |reason: VerifierReason, strict_mode: bool, requires_consent: bool| {
            VerificationDecision {
                allowed: false,
                reason,
                requires_consent,
                strict_mode,
            }
        };

        // 1. Unknown action class.
        let capability = match self.manifest.get(&request.action_class) {
            Some(capability) => capability,
            None => return deny(VerifierReason::UnknownActionClass, false, false),
        };

        // 2. Effect-class mismatch.
        if request.effect_class != capability.effect_class {
            return deny(VerifierReason::EffectClassMismatch, false, false);
        }

        // 3. Scope not allowed.
        if !capability.allowed_scopes.contains(&request.scope) {
            return deny(VerifierReason::ScopeNotAllowed, false, false);
        }

        // 4. Required verifier missing: capability.required_verifiers must
        // be a subset of request.provided_verifiers.
        if !capability
            .required_verifiers
            .is_subset(&request.provided_verifiers)
        {
            return deny(VerifierReason::RequiredVerifierMissing, false, false);
        }

        // 5. Provenance binding missing.
        for binding in &capability.provenance_bindings {
            if !provenance_field_present(request, binding) {
                return deny(VerifierReason::ProvenanceBindingMissing, false, false);
            }
        }

        // 6. Compute strict-mode.
        let strict_mode = request.rc_score >= self.rc_high_threshold
            || matches!(request.rc_state, RcState::Verify | RcState::Lockdown);

        // 7. Compute requires-consent.
        let requires_consent =
            capability.requires_consent || (strict_mode && request.effect_class != EffectClass::None);

        // 8. Lockdown posture block.
        if request.rc_state == RcState::Lockdown
            && matches!(request.effect_class, EffectClass::Privileged | EffectClass::Destructive)
        {
            return deny(VerifierReason::LockdownPostureBlock, strict_mode, requires_consent);
        }

        // 9. Consent required.
        if requires_consent {
            let consent_ok = request
                .consent
                .as_ref()
                .map(|token| token.is_valid_for(&request.action_class, &request.scope))
                .unwrap_or(false);
            if !consent_ok {
                return deny(VerifierReason::ConsentRequired, strict_mode, requires_consent);
            }
        }

        // 10. Destructive blocked in strict mode.
        if strict_mode && request.effect_class == EffectClass::Destructive {
            return deny(
                VerifierReason::DestructiveBlockedInStrictMode,
                strict_mode,
                requires_consent,
            );
        }

        // 11. Allowed.
        VerificationDecision {
            allowed: true,
            reason: VerifierReason::Allowed,
            requires_consent,
            strict_mode,
        }
    }

    fn append_audit_line(
        &self,
        path: &Path,
        request: &VerificationRequest,
        decision: &VerificationDecision,
    ) -> Result<(), CapabilityError> {
        let line = AuditLine {
            timestamp: Utc::now(),
            request: AuditRequest {
                action_class: &request.action_class,
                scope: &request.scope,
                effect_class: request.effect_class,
                rc_state: request.rc_state,
                rc_conflict_score: request.rc_score,
            },
            decision: AuditDecision {
                allowed: decision.allowed,
                reason: decision.reason.to_string(),
                requires_consent: decision.requires_consent,
                strict_mode: decision.strict_mode,
            },
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(CapabilityError::AuditWrite)?;
        let serialized = serde_json::to_string(&line)?;
        writeln!(file, "{serialized}").map_err(CapabilityError::AuditWrite)?;
        Ok(())
    }
}

/// For `input_provenance`, "present" means a non-empty sequence; for the
/// other string fields, a non-empty string (§4.4 step 5).
fn provenance_field_present(request: &VerificationRequest, binding: &str) -> bool {
    match binding {
        "source_id" => !request.provenance.source_id.is_empty(),
        "model_call_id" => request
            .provenance
            .model_call_id
            .as_ref()
            .is_some_and(|value| !value.is_empty()),
        "prompt_hash" => request
            .provenance
            .prompt_hash
            .as_ref()
            .is_some_and(|value| !value.is_empty()),
        "input_provenance" => !request.provenance.input_provenance.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodian_types::{CapabilityBuilder, ConsentToken, Provenance, SourceClass};
    use std::collections::HashSet;

    fn manifest_with(capability: custodian_types::Capability) -> CapabilityManifest {
        let mut manifest = CapabilityManifest::default();
        manifest.insert(capability);
        manifest
    }

    fn base_request(action_class: &str, scope: &str, effect_class: EffectClass) -> VerificationRequest {
        VerificationRequest {
            action_class: action_class.to_string(),
            scope: scope.to_string(),
            effect_class,
            rc_state: RcState::Normal,
            rc_score: 0.1,
            consent: None,
            provenance: Provenance::new(SourceClass::User, "test-user-message")
                .with_input_provenance(vec!["test-user-message".to_string()]),
            provided_verifiers: HashSet::new(),
        }
    }

    #[test]
    fn happy_path_scenario_1() {
        let capability = CapabilityBuilder::new("WRITE_FILE", EffectClass::Reversible)
            .allowed_scopes(["workspace:project".to_string()])
            .build();
        let verifier = CapabilityVerifier::new(manifest_with(capability));
        let request = base_request("WRITE_FILE", "workspace:project", EffectClass::Reversible);
        let decision = verifier.verify(&request).unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, VerifierReason::Allowed);
    }

    #[test]
    fn privileged_without_consent_scenario_2() {
        let capability = CapabilityBuilder::new("SEND_EMAIL", EffectClass::Privileged)
            .requires_consent(true)
            .allowed_scopes(["mailbox:primary".to_string()])
            .build();
        let verifier = CapabilityVerifier::new(manifest_with(capability));
        let request = base_request("SEND_EMAIL", "mailbox:primary", EffectClass::Privileged);
        let decision = verifier.verify(&request).unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, VerifierReason::ConsentRequired);
    }

    #[test]
    fn lockdown_with_consent_scenario_3() {
        let capability = CapabilityBuilder::new("SEND_EMAIL", EffectClass::Privileged)
            .requires_consent(true)
            .allowed_scopes(["mailbox:primary".to_string()])
            .build();
        let verifier = CapabilityVerifier::new(manifest_with(capability));
        let mut request = base_request("SEND_EMAIL", "mailbox:primary", EffectClass::Privileged);
        request.rc_state = RcState::Lockdown;
        request.rc_score = 0.95;
        request.consent = Some(ConsentToken::new("SEND_EMAIL", "mailbox:primary"));
        let decision = verifier.verify(&request).unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, VerifierReason::LockdownPostureBlock);
    }

    #[test]
    fn provenance_binding_missing_scenario_4() {
        let capability = CapabilityBuilder::new("WRITE_FILE", EffectClass::Reversible)
            .allowed_scopes(["workspace:project".to_string()])
            .provenance_bindings(["input_provenance".to_string()])
            .build();
        let verifier = CapabilityVerifier::new(manifest_with(capability));
        let mut request = base_request("WRITE_FILE", "workspace:project", EffectClass::Reversible);
        request.provenance.input_provenance = Vec::new();
        let decision = verifier.verify(&request).unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, VerifierReason::ProvenanceBindingMissing);
    }

    #[test]
    fn unknown_action_class_is_denied() {
        let verifier = CapabilityVerifier::new(CapabilityManifest::default());
        let request = base_request("NOPE", "scope", EffectClass::None);
        let decision = verifier.verify(&request).unwrap();
        assert_eq!(decision.reason, VerifierReason::UnknownActionClass);
    }

    #[test]
    fn effect_class_mismatch_always_denies() {
        let capability = CapabilityBuilder::new("WRITE_FILE", EffectClass::Reversible)
            .allowed_scopes(["workspace:project".to_string()])
            .build();
        let verifier = CapabilityVerifier::new(manifest_with(capability));
        let request = base_request("WRITE_FILE", "workspace:project", EffectClass::Destructive);
        let decision = verifier.verify(&request).unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, VerifierReason::EffectClassMismatch);
    }

    #[test]
    fn destructive_blocked_in_strict_mode() {
        let capability = CapabilityBuilder::new("DELETE_ALL", EffectClass::Destructive)
            .allowed_scopes(["workspace:project".to_string()])
            .build();
        let verifier = CapabilityVerifier::new(manifest_with(capability));
        let mut request = base_request("DELETE_ALL", "workspace:project", EffectClass::Destructive);
        request.rc_score = 0.9;
        let decision = verifier.verify(&request).unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, VerifierReason::DestructiveBlockedInStrictMode);
    }

    #[test]
    fn audit_log_receives_one_line_per_verification() {
        let dir = tempfile::tempdir().unwrap();
        let audit_path = dir.path().join("verifier_audit.jsonl");
        let capability = CapabilityBuilder::new("WRITE_FILE", EffectClass::Reversible)
            .allowed_scopes(["workspace:project".to_string()])
            .build();
        let verifier = CapabilityVerifier::new(manifest_with(capability))
            .with_audit_path(&audit_path)
            .unwrap();
        let request = base_request("WRITE_FILE", "workspace:project", EffectClass::Reversible);
        verifier.verify(&request).unwrap();
        verifier.verify(&request).unwrap();
        let contents = std::fs::read_to_string(&audit_path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
