//! Error types for scheduling and result retrieval.

use std::time::Duration;

use thiserror::Error;

use clockpool_pool::{ExecError, SubmitError};
use clockpool_timer::RegisterError;

/// Why a result retrieval failed.
#[derive(Debug, Clone, Error)]
pub enum JoinError {
    /// A bounded wait spent its whole budget before the job settled.
    /// Carries the originally requested timeout.
    #[error("timeout of {requested:?} exceeded")]
    Timeout {
        /// The timeout the caller asked for, before any budget splitting.
        requested: Duration,
    },
    /// The job was cancelled in either phase before producing a result.
    #[error("task was cancelled")]
    Cancelled,
    /// The job body failed.
    #[error("task failed")]
    Failed(#[source] ExecError),
}

impl JoinError {
    pub(crate) fn from_exec(err: ExecError) -> Self {
        match err {
            ExecError::Cancelled => JoinError::Cancelled,
            other => JoinError::Failed(other),
        }
    }
}

/// Why a scheduling request was refused.
#[derive(Debug, Clone, Error)]
pub enum ScheduleError {
    /// The executor no longer accepts work.
    #[error("executor is shut down")]
    Shutdown,
}

impl From<RegisterError> for ScheduleError {
    fn from(err: RegisterError) -> Self {
        match err {
            RegisterError::Shutdown => ScheduleError::Shutdown,
        }
    }
}

impl From<SubmitError> for ScheduleError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Shutdown => ScheduleError::Shutdown,
        }
    }
}
