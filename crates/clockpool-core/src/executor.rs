//! The [`ClockPool`] facade.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use clockpool_pool::{ExecHandle, TaskId, WorkerPool};
use clockpool_timer::{Timer, TriggerId};

use crate::adapter::{OnceJob, PeriodicJob};
use crate::budget::WaitBudget;
use crate::errors::ScheduleError;
use crate::handle::JobHandle;

/// Work reported by [`ClockPool::shutdown_now`] that never ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortedTask {
    /// A timer registration that never fired.
    Trigger(TriggerId),
    /// A pool job that never started.
    Queued(TaskId),
}

/// Facade joining the timer service and the worker pool.
///
/// Scheduling builds an adapter + [`JobHandle`] pair, registers the
/// adapter with the timer and attaches the returned trigger handle before
/// the call returns; callers never observe a handle-less job.
/// Pool-management operations fan out to both services.
#[derive(Debug)]
pub struct ClockPool {
    timer: Timer,
    pool: Arc<WorkerPool>,
}

impl ClockPool {
    /// Joins an already-running timer and pool.
    pub fn new(timer: Timer, pool: WorkerPool) -> Self {
        Self {
            timer,
            pool: Arc::new(pool),
        }
    }

    /// Schedules `fut` to start on the pool once `delay` has elapsed.
    pub fn schedule_once<F>(
        &self,
        fut: F,
        delay: Duration,
    ) -> Result<JobHandle<F::Output>, ScheduleError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = JobHandle::new();
        let adapter = Arc::new(OnceJob::new(fut, handle.core(), self.pool.clone()));
        let trigger = self.timer.schedule_once(adapter, delay)?;
        handle.attach_trigger(trigger);
        Ok(handle)
    }

    /// Schedules `make` to produce and run a job after `initial_delay`,
    /// then every `period` measured from the previous due time.
    pub fn schedule_fixed_rate<M, F>(
        &self,
        make: M,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<JobHandle<()>, ScheduleError>
    where
        M: Fn() -> F + Send + Sync + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = JobHandle::new();
        let adapter = Arc::new(PeriodicJob::new(make, handle.core(), self.pool.clone()));
        let trigger = self
            .timer
            .schedule_fixed_rate(adapter, initial_delay, period)?;
        handle.attach_trigger(trigger);
        Ok(handle)
    }

    /// Schedules `make` to produce and run a job after `initial_delay`,
    /// then every `delay` measured from the completion of the previous
    /// firing.
    pub fn schedule_fixed_delay<M, F>(
        &self,
        make: M,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<JobHandle<()>, ScheduleError>
    where
        M: Fn() -> F + Send + Sync + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = JobHandle::new();
        let adapter = Arc::new(PeriodicJob::new(make, handle.core(), self.pool.clone()));
        let trigger = self
            .timer
            .schedule_fixed_delay(adapter, initial_delay, delay)?;
        handle.attach_trigger(trigger);
        Ok(handle)
    }

    /// Direct pool submission; no timer phase involved.
    pub fn submit<F>(&self, fut: F) -> Result<ExecHandle<F::Output>, ScheduleError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.pool.submit(fut).map_err(ScheduleError::from)
    }

    /// Shuts down both services, timer first. Best-effort: one service
    /// failing to wind down does not keep the other from being asked.
    pub fn shutdown(&self) {
        info!("executor shutdown");
        self.timer.shutdown();
        self.pool.shutdown();
    }

    /// Halts both services and returns the union of work that never ran.
    pub async fn shutdown_now(&self) -> Vec<AbortedTask> {
        info!("executor halt");
        let unfired = self.timer.shutdown_now().await;
        let never_ran = self.pool.shutdown_now();
        unfired
            .into_iter()
            .map(AbortedTask::Trigger)
            .chain(never_ran.into_iter().map(AbortedTask::Queued))
            .collect()
    }

    /// True only when both services have been asked to shut down.
    pub fn is_shutdown(&self) -> bool {
        self.timer.is_shutdown() && self.pool.is_shutdown()
    }

    /// True only when both services have fully wound down.
    pub fn is_terminated(&self) -> bool {
        self.timer.is_terminated() && self.pool.is_terminated()
    }

    /// Waits for both services to terminate, bounding the two sequential
    /// waits by one shared budget. False on budget exhaustion.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        let mut budget = WaitBudget::new(timeout);
        if !self.timer.await_termination(budget.start()).await {
            return false;
        }
        self.pool.await_termination(budget.remaining()).await
    }
}
