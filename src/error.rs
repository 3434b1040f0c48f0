//! Error types for the AutoVPN orchestration core.

use thiserror::Error;

/// Persistence-related errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to open playbook store: {0}")]
    Open(String),

    #[error("Failed to encode or decode playbook record: {0}")]
    Codec(String),

    #[error("Store I/O error: {0}")]
    Io(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Configuration and logging-setup errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid logging configuration: {0}")]
    Logging(String),
}

/// Errors raised by DNS and route adapters, or by their construction
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Unknown adapter kind: {0}")]
    UnknownKind(String),

    #[error("Adapter authentication failed: {0}")]
    Auth(String),

    #[error("Adapter operation failed: {0}")]
    Operation(String),
}

/// DNS-over-HTTPS resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("DoH request failed: {0}")]
    Request(String),

    #[error("DoH response malformed: {0}")]
    Malformed(String),
}

/// Task-level errors surfaced when building or running an operation
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("Failed to parse playbook: {0}")]
    Parse(String),

    #[error("Store failure: {0}")]
    Store(String),

    #[error("Task step failed: {0}")]
    Step(String),
}

impl From<StoreError> for TaskError {
    fn from(err: StoreError) -> Self {
        TaskError::Store(err.to_string())
    }
}
