//! Domain-level error taxonomy for the Strider worker.

use std::path::PathBuf;

/// Errors produced when a plugin or config file contributes a malformed entry.
///
/// These are raised while the registry is being built, before the queue
/// accepts any job.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("{source_name}: {phase} action must not be empty")]
    EmptyAction { source_name: String, phase: String },

    #[error("{source_name}: detection rule has an empty filename")]
    EmptyFilename { source_name: String },

    #[error("{source_name}: unknown phase {phase}")]
    UnknownPhase { source_name: String, phase: String },
}

/// Strider worker errors.
#[derive(Debug, thiserror::Error)]
pub enum StriderError {
    #[error("repository sync failed: {0}")]
    Sync(String),

    #[error("project detection failed: {0}")]
    Detection(String),

    #[error("failed to spawn {program} in {cwd}: {source}")]
    Spawn {
        program: String,
        cwd: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job queue is closed")]
    QueueClosed,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Strider worker operations.
pub type Result<T> = std::result::Result<T, StriderError>;
