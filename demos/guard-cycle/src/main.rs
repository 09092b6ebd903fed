//! Illustrative driver for the guarded execution runtime.
//!
//! Reproduces the happy-path and privileged-without-consent cycles (§8
//! scenarios 1-2) and the rollout-ranking scenario (§8 scenario 8) against
//! a scratch sandbox, printing each outcome as pretty JSON the way the
//! `run-cycle`/`plan-demo` CLI surface does (§6).

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Result;
use custodian_runtime::{GuardedRuntime, RolloutProposal, RolloutSignals, RuntimeConfig};
use custodian_types::{EffectClass, Provenance, SourceClass};

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let workdir = tempfile::tempdir()?;
    let config = demo_config(workdir.path());
    write_demo_manifest(&config.storage.capability_manifest_path)?;

    let mut runtime = GuardedRuntime::new(&config)?;

    println!("# run-cycle: happy path (§8 scenario 1)");
    let happy = runtime.run_cycle(custodian_types::CycleRequest {
        action_class: "WRITE_FILE".to_string(),
        scope: "workspace:project".to_string(),
        effect_class: EffectClass::Reversible,
        command: vec!["echo".to_string(), "runtime_cycle_ok".to_string()],
        proposal_type: "TRAJ".to_string(),
        payload: BTreeMap::new(),
        provenance: Provenance::new(SourceClass::ModelInternal, "demo-model")
            .with_input_provenance(vec!["test-user-message".to_string()]),
        rc_score: Some(0.2),
        rc_signals: None,
        consent: None,
        provided_verifiers: HashSet::new(),
        trajectory_reference: Some("demo-happy-path".to_string()),
    })?;
    println!("{}", serde_json::to_string_pretty(&happy)?);

    println!("\n# run-cycle: privileged action without consent (§8 scenario 2)");
    let denied = runtime.run_cycle(custodian_types::CycleRequest {
        action_class: "SEND_EMAIL".to_string(),
        scope: "mailbox:primary".to_string(),
        effect_class: EffectClass::Privileged,
        command: vec!["echo".to_string(), "would_send".to_string()],
        proposal_type: "TRAJ".to_string(),
        payload: BTreeMap::new(),
        provenance: Provenance::new(SourceClass::ModelInternal, "demo-model")
            .with_input_provenance(vec!["test-user-message".to_string()]),
        rc_score: Some(0.2),
        rc_signals: None,
        consent: None,
        provided_verifiers: HashSet::new(),
        trajectory_reference: Some("demo-no-consent".to_string()),
    })?;
    println!("{}", serde_json::to_string_pretty(&denied)?);

    println!("\nchain verifies: {}", runtime.ledger().verify_chain()?);

    println!("\n# plan-demo: rollout ranking (§8 scenario 8)");
    let proposals = vec![
        RolloutProposal::new(
            "write the migration notes",
            "WRITE_FILE",
            "workspace:project",
            EffectClass::Reversible,
            vec!["echo".to_string(), "plan-a".to_string()],
            "A",
        )
        .with_input_provenance(vec!["test-user-message".to_string()]),
        RolloutProposal::new(
            "write the changelog",
            "WRITE_FILE",
            "workspace:project",
            EffectClass::Reversible,
            vec!["echo".to_string(), "plan-b".to_string()],
            "B",
        )
        .with_input_provenance(vec!["test-user-message".to_string()]),
    ];
    let mut overrides = HashMap::new();
    overrides.insert("A".to_string(), RolloutSignals::new(0.9, 0.7)?);
    overrides.insert("B".to_string(), RolloutSignals::new(0.4, 0.9)?);
    let ranked = runtime.plan_rollouts(&proposals, &overrides)?;
    for evaluation in &ranked {
        println!(
            "{{\"trajectory_reference\": \"{}\", \"ranking_score\": {:.4}}}",
            evaluation.candidate.trajectory_reference, evaluation.ranking_score
        );
    }

    Ok(())
}

fn demo_config(root: &std::path::Path) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.storage.capability_manifest_path = root.join("capabilities.json");
    config.storage.ledger_path = root.join("ledger.jsonl");
    config.storage.audit_log_path = root.join("verifier_audit.jsonl");
    config.storage.offline_output_dir = root.join("offline");
    config.storage.session_memory_path = root.join("autonomy").join("session_memory.jsonl");
    config.sandbox.root = root.join("sandbox");
    config.sandbox.allowed_commands = vec!["echo".to_string()];
    config
}

fn write_demo_manifest(path: &std::path::Path) -> Result<()> {
    std::fs::write(
        path,
        serde_json::to_string_pretty(&serde_json::json!({
            "capabilities": [
                {
                    "action_class": "WRITE_FILE",
                    "effect_class": "reversible",
                    "allowed_scopes": ["workspace:project"]
                },
                {
                    "action_class": "SEND_EMAIL",
                    "effect_class": "privileged",
                    "requires_consent": true,
                    "allowed_scopes": ["mailbox:primary"]
                }
            ]
        }))?,
    )?;
    Ok(())
}
