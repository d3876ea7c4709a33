//! Error types for the worker pool.

use thiserror::Error;

/// Why a submitted job produced no value. Surfaces only at result
/// retrieval, never eagerly.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// The job was cancelled before or while running.
    #[error("job was cancelled")]
    Cancelled,
    /// The job body panicked. The worker survives; the payload ends up
    /// here.
    #[error("job panicked: {0}")]
    Panicked(String),
}

/// Why a submission was refused.
#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    /// The pool no longer accepts work.
    #[error("worker pool is shut down")]
    Shutdown,
}
