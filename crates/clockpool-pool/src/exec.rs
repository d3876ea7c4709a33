//! Per-job lifecycle state and the caller-facing [`ExecHandle`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::errors::ExecError;
use crate::ids::TaskId;

enum ExecState<T> {
    Queued,
    Running,
    // never ran, or was interrupted mid-run
    Cancelled,
    Finished(Result<T, ExecError>),
}

/// State shared between an [`ExecHandle`] and the worker running the job.
pub(crate) struct ExecShared<T> {
    id: TaskId,
    state: Mutex<ExecState<T>>,
    done_tx: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl<T> ExecShared<T> {
    pub(crate) fn new(id: TaskId) -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            id,
            state: Mutex::new(ExecState::Queued),
            done_tx,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, ExecState<T>> {
        self.state.lock().expect("exec state lock poisoned")
    }

    /// Queued → Running. False when the job was cancelled while queued,
    /// in which case it must not run.
    pub(crate) fn mark_running(&self) -> bool {
        let mut state = self.lock_state();
        match *state {
            ExecState::Queued => {
                *state = ExecState::Running;
                true
            }
            _ => false,
        }
    }

    /// Running → Finished. Ignored when an interrupt already settled the
    /// job.
    pub(crate) fn finish(&self, outcome: Result<T, ExecError>) {
        let mut state = self.lock_state();
        if matches!(*state, ExecState::Running) {
            *state = ExecState::Finished(outcome);
            drop(state);
            self.done_tx.send_replace(true);
        }
    }

    /// Running → Cancelled, after the cancel token won the race against
    /// the job body.
    pub(crate) fn mark_interrupted(&self) {
        let mut state = self.lock_state();
        if matches!(*state, ExecState::Running) {
            *state = ExecState::Cancelled;
            drop(state);
            self.done_tx.send_replace(true);
        }
    }

    fn cancel_inner(&self, may_interrupt: bool) -> bool {
        let mut state = self.lock_state();
        match *state {
            ExecState::Queued => {
                *state = ExecState::Cancelled;
                drop(state);
                self.cancel.cancel();
                self.done_tx.send_replace(true);
                true
            }
            ExecState::Running if may_interrupt => {
                drop(state);
                self.cancel.cancel();
                true
            }
            ExecState::Running => false,
            ExecState::Cancelled => true,
            ExecState::Finished(_) => false,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(*self.lock_state(), ExecState::Cancelled)
    }

    pub(crate) fn is_done(&self) -> bool {
        matches!(
            *self.lock_state(),
            ExecState::Cancelled | ExecState::Finished(_)
        )
    }

    fn done_rx(&self) -> watch::Receiver<bool> {
        self.done_tx.subscribe()
    }

    fn outcome(&self) -> Result<T, ExecError>
    where
        T: Clone,
    {
        match &*self.lock_state() {
            ExecState::Finished(outcome) => outcome.clone(),
            ExecState::Cancelled => Err(ExecError::Cancelled),
            ExecState::Queued | ExecState::Running => {
                unreachable!("outcome read before the done signal fired")
            }
        }
    }

    /// Cancels outright for an immediate pool halt; interrupts when
    /// already running. True when the job had not started.
    pub(crate) fn abort(&self) -> bool {
        let mut state = self.lock_state();
        match *state {
            ExecState::Queued => {
                *state = ExecState::Cancelled;
                drop(state);
                self.cancel.cancel();
                self.done_tx.send_replace(true);
                true
            }
            ExecState::Running => {
                drop(state);
                self.cancel.cancel();
                false
            }
            _ => false,
        }
    }
}

/// Handle to one job submitted to the pool.
pub struct ExecHandle<T> {
    pub(crate) shared: Arc<ExecShared<T>>,
}

impl<T> Clone for ExecHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for ExecHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecHandle")
            .field("id", &self.shared.id())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> ExecHandle<T> {
    /// Identifier of this job.
    pub fn id(&self) -> TaskId {
        self.shared.id()
    }

    /// Cancels the job. A queued job is prevented from running. A running
    /// job is interrupted (cooperatively, at its next await point) only
    /// when `may_interrupt` is set; otherwise it is left alone and the
    /// call returns `false`. A finished job cannot be cancelled.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        self.shared.cancel_inner(may_interrupt)
    }

    /// True once the job was cancelled before or while running.
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// True once the job reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.shared.is_done()
    }

    /// Waits for the job to settle and returns its outcome. Safe to call
    /// repeatedly; the stored result is cloned out. Bound the wait with
    /// `tokio::time::timeout` when needed.
    pub async fn join(&self) -> Result<T, ExecError>
    where
        T: Clone,
    {
        let mut rx = self.shared.done_rx();
        let _ = rx.wait_for(|done| *done).await;
        self.shared.outcome()
    }
}
