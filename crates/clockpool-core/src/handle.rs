//! The composite handle joining both phases of a scheduled job.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use clockpool_pool::{ExecHandle, SubmitError};
use clockpool_timer::TriggerHandle;

use crate::budget::WaitBudget;
use crate::errors::JoinError;

/// Shared core of a [`JobHandle`]: the two phase handles and their
/// readiness signals.
///
/// The trigger handle is write-once-then-read, so the slot and its
/// readiness signal fuse into one watch channel. The exec slot must
/// serialize with cancellation, so it sits behind a mutex with a separate
/// readiness watch fired under that lock.
pub(crate) struct JobCore<T> {
    trigger_tx: watch::Sender<Option<TriggerHandle>>,
    exec_slot: Mutex<Option<ExecHandle<T>>>,
    exec_ready_tx: watch::Sender<bool>,
}

impl<T: Send + 'static> JobCore<T> {
    pub(crate) fn new() -> Arc<Self> {
        let (trigger_tx, _) = watch::channel(None);
        let (exec_ready_tx, _) = watch::channel(false);
        Arc::new(Self {
            trigger_tx,
            exec_slot: Mutex::new(None),
            exec_ready_tx,
        })
    }

    /// Publishes the trigger handle; wakes every waiter. Called exactly
    /// once, before the caller ever sees the [`JobHandle`].
    pub(crate) fn attach_trigger(&self, trigger: TriggerHandle) {
        self.trigger_tx.send_replace(Some(trigger));
    }

    /// Waits until the trigger handle has been attached and clones it out.
    pub(crate) async fn trigger(&self) -> TriggerHandle {
        let mut rx = self.trigger_tx.subscribe();
        let trigger = {
            let slot = rx
                .wait_for(|slot| slot.is_some())
                .await
                .expect("trigger publisher is owned by this core");
            slot.as_ref().cloned()
        };
        trigger.expect("slot is occupied once the watch fires")
    }

    /// The adapter's locked section: check-cancel, submit, store, signal.
    /// Runs on the timer task, once per firing.
    pub(crate) async fn dispatch(
        &self,
        submit: impl FnOnce() -> Result<ExecHandle<T>, SubmitError>,
    ) {
        let trigger = self.trigger().await;
        let mut slot = self.exec_slot.lock().await;
        if trigger.is_cancelled() {
            debug!(trigger_id = %trigger.id(), "firing suppressed by cancel");
            return;
        }
        match submit() {
            Ok(exec) => {
                debug!(trigger_id = %trigger.id(), task_id = %exec.id(), "fired job dispatched");
                *slot = Some(exec);
                self.exec_ready_tx.send_replace(true);
            }
            Err(err) => {
                warn!(trigger_id = %trigger.id(), error = %err, "pool rejected fired job");
            }
        }
    }
}

/// Caller-facing handle joining the trigger phase and the execution phase
/// of one scheduled job.
///
/// Every operation first waits for the trigger handle to be attached;
/// that wait is bounded by the scheduling call stack itself and is never
/// observable as contention by callers.
pub struct JobHandle<T> {
    core: Arc<JobCore<T>>,
}

impl<T> Clone for JobHandle<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T> fmt::Debug for JobHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> JobHandle<T> {
    pub(crate) fn new() -> Self {
        Self {
            core: JobCore::new(),
        }
    }

    pub(crate) fn core(&self) -> Arc<JobCore<T>> {
        self.core.clone()
    }

    pub(crate) fn attach_trigger(&self, trigger: TriggerHandle) {
        self.core.attach_trigger(trigger);
    }

    /// Time until the next firing; zero once the deadline has passed.
    pub async fn remaining_delay(&self) -> Duration {
        self.core.trigger().await.remaining_delay()
    }

    /// The next fire deadline.
    pub async fn deadline(&self) -> Instant {
        self.core.trigger().await.deadline()
    }

    /// Orders two scheduled jobs by their next fire deadline.
    pub async fn compare_deadline<U: Send + 'static>(&self, other: &JobHandle<U>) -> Ordering {
        let this = self.deadline().await;
        let that = other.deadline().await;
        this.cmp(&that)
    }

    /// Cancels the job. Before the firing this cancels the trigger alone,
    /// which permanently suppresses submission to the pool. After the
    /// firing it cancels both phases and succeeds when either had
    /// anything left to stop: for a one-shot job the trigger is already
    /// spent, so this is the execution's verdict; for a periodic job,
    /// stopping future firings counts even when the latest execution
    /// already completed.
    pub async fn cancel(&self, may_interrupt: bool) -> bool {
        let trigger = self.core.trigger().await;
        let slot = self.core.exec_slot.lock().await;
        match slot.as_ref() {
            None => trigger.cancel(),
            Some(exec) => {
                let trigger_cancelled = trigger.cancel();
                exec.cancel(may_interrupt) || trigger_cancelled
            }
        }
    }

    /// True only when the phase actually reached — trigger before the
    /// firing, execution after — reports cancelled. A job that fired and
    /// ran to completion is not cancelled, whatever later happened to its
    /// trigger.
    pub async fn is_cancelled(&self) -> bool {
        let trigger = self.core.trigger().await;
        let slot = self.core.exec_slot.lock().await;
        match slot.as_ref() {
            None => trigger.is_cancelled(),
            Some(exec) => trigger.is_cancelled() && exec.is_cancelled(),
        }
    }

    /// Reflects the phase in progress: trigger-done while nothing has been
    /// submitted yet, execution-done afterwards.
    pub async fn is_done(&self) -> bool {
        let trigger = self.core.trigger().await;
        let slot = self.core.exec_slot.lock().await;
        match slot.as_ref() {
            None => trigger.is_done(),
            Some(exec) => exec.is_done(),
        }
    }

    /// Waits for the job to settle and returns the execution's result.
    ///
    /// Four suspension points in fixed order: trigger readiness, trigger
    /// completion, execution readiness, execution completion. The order is
    /// load-bearing — the execution handle cannot exist before the trigger
    /// fires.
    pub async fn join(&self) -> Result<T, JoinError>
    where
        T: Clone,
    {
        let trigger = self.core.trigger().await;
        trigger.join().await.map_err(|_| JoinError::Cancelled)?;
        let exec = self.exec().await;
        exec.join().await.map_err(JoinError::from_exec)
    }

    /// Like [`join`](Self::join), but every wait draws on one shared
    /// [`WaitBudget`]; a slow phase leaves less for the next, and total
    /// blocking never exceeds `timeout`. A zero timeout fails immediately
    /// unless the awaited signals have already fired.
    pub async fn join_timeout(&self, timeout: Duration) -> Result<T, JoinError>
    where
        T: Clone,
    {
        let mut budget = WaitBudget::new(timeout);

        let trigger = match tokio::time::timeout(budget.start(), self.core.trigger()).await {
            Ok(trigger) => trigger,
            Err(_) => return Err(JoinError::Timeout { requested: timeout }),
        };
        match tokio::time::timeout(budget.remaining(), trigger.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(JoinError::Cancelled),
            Err(_) => return Err(JoinError::Timeout { requested: timeout }),
        }
        let exec = match tokio::time::timeout(budget.remaining(), self.exec()).await {
            Ok(exec) => exec,
            Err(_) => return Err(JoinError::Timeout { requested: timeout }),
        };
        match tokio::time::timeout(budget.remaining(), exec.join()).await {
            Ok(outcome) => outcome.map_err(JoinError::from_exec),
            Err(_) => Err(JoinError::Timeout { requested: timeout }),
        }
    }

    async fn exec(&self) -> ExecHandle<T> {
        let mut rx = self.core.exec_ready_tx.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
        self.core
            .exec_slot
            .lock()
            .await
            .clone()
            .expect("exec slot is occupied once the watch fires")
    }
}
