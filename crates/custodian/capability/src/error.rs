use thiserror::Error;

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("failed to read manifest file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to write audit log: {0}")]
    AuditWrite(#[source] std::io::Error),
}
