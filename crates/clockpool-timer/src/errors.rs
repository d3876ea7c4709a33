//! Error types for the trigger service.

use thiserror::Error;

/// Why a registration was refused.
#[derive(Debug, Clone, Error)]
pub enum RegisterError {
    /// The timer no longer accepts registrations.
    #[error("timer is shut down")]
    Shutdown,
}

/// Why waiting on a trigger failed.
#[derive(Debug, Clone, Error)]
pub enum TriggerError {
    /// The registration was cancelled before its firing completed.
    #[error("trigger was cancelled")]
    Cancelled,
}
