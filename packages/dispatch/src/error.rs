//! Error types for the dispatch runtime.

use job_core::ConfigError;

/// Result type for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Error type for dispatcher setup and teardown.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("{failed} worker thread(s) panicked outside of a job")]
    WorkerPanicked { failed: usize },

    #[error("Too many items for one dispatch: {0}")]
    TooManyItems(usize),
}
