use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Credential resolution failed: {0}")]
    CredentialResolution(String),

    #[error("Failed to materialize credentials: {0}")]
    Materialization(String),

    #[error("Server was not ready within {waited_secs}s")]
    ReadinessTimeout { waited_secs: u64 },

    #[error("Failed to enumerate streams: {0}")]
    Enumeration(String),

    #[error("Transfer of stream {unit} failed: {reason}")]
    Transfer { unit: String, reason: String },

    #[error("Failed to reconcile existing streams: {0}")]
    Reconciliation(String),

    #[error("Snapshot engine failed: {0}")]
    Delegation(String),

    #[error("Command {program} exited with {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: String,
        stderr: String,
    },

    #[error("{kind} {namespace}/{name} not found")]
    ObjectNotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Readiness timeouts may be retried by an outer caller with a longer
    /// deadline. Every other error is terminal.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::ReadinessTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
