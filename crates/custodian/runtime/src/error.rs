use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("command cannot be empty")]
    EmptyCommand,

    #[error("unknown proposal payload type: {0}")]
    UnknownPayloadType(String),

    #[error("either rc_score or rc_signals must be supplied")]
    MissingRcScore,

    #[error(transparent)]
    Types(#[from] custodian_types::TypesError),

    #[error(transparent)]
    Router(#[from] custodian_router::RouterError),

    #[error(transparent)]
    Rc(#[from] custodian_rc::RcError),

    #[error(transparent)]
    Capability(#[from] custodian_capability::CapabilityError),

    #[error(transparent)]
    Sandbox(#[from] custodian_sandbox::SandboxError),

    #[error(transparent)]
    Ledger(#[from] custodian_ledger::LedgerError),

    #[error(transparent)]
    Consolidator(#[from] custodian_consolidator::ConsolidatorError),

    #[error(transparent)]
    Rollout(#[from] custodian_rollout::RolloutError),

    #[error(transparent)]
    Memory(#[from] custodian_memory::SessionMemoryError),

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
