//! Error types for the training loop

use thiserror::Error;

/// Fatal errors: surfaced to the caller and terminate the run
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration detected at startup or rebuild (not retried)
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Checkpoint artifact missing, unreadable, or inconsistent
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// State failed to (de)serialize
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for fatal-or-ok operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transient resource exhaustion during a training step (treated as possible
/// out-of-memory). Recovered locally by the orchestrator, never surfaced.
#[derive(Debug, Clone, Error)]
#[error("resource exhausted: {0}")]
pub struct ResourceExhausted(pub String);

/// Result type for model-facing step operations
pub type StepResult<T> = std::result::Result<T, ResourceExhausted>;

/// Outcome of one guarded loop iteration. Exhaustion is recovered in place;
/// everything else propagates and terminates the run.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Exhausted(#[from] ResourceExhausted),

    #[error(transparent)]
    Fatal(#[from] Error),
}
