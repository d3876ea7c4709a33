//! Handles to individual timer registrations.

use std::fmt::{self, Display};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use uuid::Uuid;

use crate::errors::TriggerError;
use crate::service::TimerCommand;

/// Identifier of one timer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerId(Uuid);

impl TriggerId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TriggerState {
    Scheduled,
    Done,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelOutcome {
    DidCancel,
    AlreadyCancelled,
    AlreadyDone,
}

/// State shared between a [`TriggerHandle`] and the driver task.
#[derive(Debug)]
pub(crate) struct TriggerShared {
    id: TriggerId,
    // next due time; the driver moves it forward on every re-arm
    deadline: Mutex<Instant>,
    state: Mutex<TriggerState>,
    done_tx: watch::Sender<bool>,
}

impl TriggerShared {
    pub(crate) fn new(id: TriggerId, deadline: Instant) -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            id,
            deadline: Mutex::new(deadline),
            state: Mutex::new(TriggerState::Scheduled),
            done_tx,
        }
    }

    pub(crate) fn id(&self) -> TriggerId {
        self.id
    }

    pub(crate) fn deadline(&self) -> Instant {
        *self.deadline.lock().expect("deadline lock poisoned")
    }

    pub(crate) fn set_deadline(&self, next: Instant) {
        *self.deadline.lock().expect("deadline lock poisoned") = next;
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *self.state.lock().expect("state lock poisoned") == TriggerState::Cancelled
    }

    pub(crate) fn is_done(&self) -> bool {
        *self.state.lock().expect("state lock poisoned") != TriggerState::Scheduled
    }

    /// One-shot firing completed. No-op if the trigger lost to a cancel.
    pub(crate) fn mark_done(&self) {
        let mut state = self.state.lock().expect("state lock poisoned");
        if *state == TriggerState::Scheduled {
            *state = TriggerState::Done;
            drop(state);
            self.done_tx.send_replace(true);
        }
    }

    pub(crate) fn mark_cancelled(&self) -> CancelOutcome {
        let mut state = self.state.lock().expect("state lock poisoned");
        match *state {
            TriggerState::Scheduled => {
                *state = TriggerState::Cancelled;
                drop(state);
                self.done_tx.send_replace(true);
                CancelOutcome::DidCancel
            }
            TriggerState::Cancelled => CancelOutcome::AlreadyCancelled,
            TriggerState::Done => CancelOutcome::AlreadyDone,
        }
    }

    pub(crate) fn done_rx(&self) -> watch::Receiver<bool> {
        self.done_tx.subscribe()
    }
}

/// Cancelable, queryable handle to one timer registration.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    pub(crate) shared: Arc<TriggerShared>,
    pub(crate) cmd_tx: mpsc::UnboundedSender<TimerCommand>,
}

impl TriggerHandle {
    /// Identifier of this registration.
    pub fn id(&self) -> TriggerId {
        self.shared.id()
    }

    /// The next due time.
    pub fn deadline(&self) -> Instant {
        self.shared.deadline()
    }

    /// Time until the next firing; zero once the deadline has passed.
    pub fn remaining_delay(&self) -> Duration {
        self.shared
            .deadline()
            .saturating_duration_since(Instant::now())
    }

    /// True once the registration was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// True once the registration will never fire again, whether it
    /// completed or was cancelled. Periodic registrations only ever get
    /// here through cancellation.
    pub fn is_done(&self) -> bool {
        self.shared.is_done()
    }

    /// Cancels the registration. Returns `true` when the trigger will not
    /// fire (again) because of cancellation, `false` when a one-shot
    /// firing already completed.
    pub fn cancel(&self) -> bool {
        match self.shared.mark_cancelled() {
            CancelOutcome::DidCancel => {
                // best-effort: the driver drops its queue entry; if the
                // driver is gone the state flip above already settled it
                let _ = self.cmd_tx.send(TimerCommand::Cancel(self.id()));
                true
            }
            CancelOutcome::AlreadyCancelled => true,
            CancelOutcome::AlreadyDone => false,
        }
    }

    /// Resolves once a one-shot firing has completed, or fails once the
    /// registration is cancelled. Periodic registrations resolve only
    /// through cancellation.
    pub async fn join(&self) -> Result<(), TriggerError> {
        let mut rx = self.shared.done_rx();
        let _ = rx.wait_for(|done| *done).await;
        if self.shared.is_cancelled() {
            Err(TriggerError::Cancelled)
        } else {
            Ok(())
        }
    }
}
