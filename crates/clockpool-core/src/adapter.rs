use std::future::Future;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;

use clockpool_pool::WorkerPool;
use clockpool_timer::TimerJob;

use crate::handle::JobCore;

/// One-shot bridge from a firing to a pool submission. The job future is
/// consumed at the single firing; the cancel check and the submission
/// share the handle's lock, so a cancel that wins the race suppresses the
/// submission entirely.
pub(crate) struct OnceJob<F: Future> {
    fut: Mutex<Option<F>>,
    core: Arc<JobCore<F::Output>>,
    pool: Arc<WorkerPool>,
}

impl<F> OnceJob<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    pub(crate) fn new(fut: F, core: Arc<JobCore<F::Output>>, pool: Arc<WorkerPool>) -> Self {
        Self {
            fut: Mutex::new(Some(fut)),
            core,
            pool,
        }
    }
}

impl<F> TimerJob for OnceJob<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn fire(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let Some(fut) = self.fut.lock().expect("job slot lock poisoned").take() else {
                return;
            };
            self.core.dispatch(|| self.pool.submit(fut)).await;
        })
    }
}

/// Periodic bridge: builds and submits a fresh job per firing. The
/// handle's exec slot tracks the most recent firing.
pub(crate) struct PeriodicJob<M> {
    make: M,
    core: Arc<JobCore<()>>,
    pool: Arc<WorkerPool>,
}

impl<M, F> PeriodicJob<M>
where
    M: Fn() -> F + Send + Sync + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    pub(crate) fn new(make: M, core: Arc<JobCore<()>>, pool: Arc<WorkerPool>) -> Self {
        Self { make, core, pool }
    }
}

impl<M, F> TimerJob for PeriodicJob<M>
where
    M: Fn() -> F + Send + Sync + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    fn fire(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            self.core.dispatch(|| self.pool.submit((self.make)())).await;
        })
    }
}
