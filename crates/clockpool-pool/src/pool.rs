//! The [`WorkerPool`] and its worker loop.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::errors::{ExecError, SubmitError};
use crate::exec::{ExecHandle, ExecShared};
use crate::ids::TaskId;

pub(crate) trait Abortable: Send + Sync {
    /// Cancels outright; interrupts when already running. True when the
    /// job had not started.
    fn abort(&self) -> bool;
}

impl<T: Send + 'static> Abortable for ExecShared<T> {
    fn abort(&self) -> bool {
        ExecShared::abort(self)
    }
}

type Registry = Arc<Mutex<HashMap<TaskId, Arc<dyn Abortable>>>>;

struct PoolJob {
    id: TaskId,
    run: Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>,
}

/// Fixed-size worker pool executing submitted jobs.
pub struct WorkerPool {
    job_tx: Mutex<Option<mpsc::UnboundedSender<PoolJob>>>,
    // queued and running jobs; entries remove themselves on completion
    registry: Registry,
    is_shutdown: AtomicBool,
    terminated: watch::Receiver<bool>,
    workers: usize,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Spawns `workers` worker tasks plus one supervisor that flips the
    /// terminated signal once all of them have exited. Must be called
    /// from within a tokio runtime.
    pub fn new(workers: usize) -> Self {
        assert!(workers > 0, "pool needs at least one worker");
        info!(workers, "initializing worker pool");

        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));
        let (terminated_tx, terminated) = watch::channel(false);

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            handles.push(tokio::spawn(worker_loop(worker, job_rx.clone())));
        }
        tokio::spawn(async move {
            for handle in handles {
                let _ = handle.await;
            }
            info!("worker pool terminated");
            terminated_tx.send_replace(true);
        });

        Self {
            job_tx: Mutex::new(Some(job_tx)),
            registry: Arc::new(Mutex::new(HashMap::new())),
            is_shutdown: AtomicBool::new(false),
            terminated,
            workers,
        }
    }

    /// Queues `fut` for execution and returns its handle.
    pub fn submit<F>(&self, fut: F) -> Result<ExecHandle<F::Output>, SubmitError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let id = TaskId::new();
        let shared = Arc::new(ExecShared::new(id));
        let job = PoolJob {
            id,
            run: wrap_job(fut, shared.clone(), self.registry.clone()),
        };

        let tx = self.job_tx.lock().expect("sender lock poisoned");
        let tx = tx.as_ref().ok_or(SubmitError::Shutdown)?;
        self.registry
            .lock()
            .expect("registry lock poisoned")
            .insert(id, shared.clone());
        if tx.send(job).is_err() {
            self.registry
                .lock()
                .expect("registry lock poisoned")
                .remove(&id);
            return Err(SubmitError::Shutdown);
        }
        debug!(task_id = %id, "job submitted");
        Ok(ExecHandle { shared })
    }

    /// Stops accepting work. Workers drain and run everything already
    /// queued, then exit.
    pub fn shutdown(&self) {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("worker pool shutdown initiated");
        self.job_tx.lock().expect("sender lock poisoned").take();
    }

    /// Stops accepting work, prevents queued jobs from running and
    /// interrupts running ones. Returns ids of jobs that never started.
    pub fn shutdown_now(&self) -> Vec<TaskId> {
        self.is_shutdown.store(true, Ordering::SeqCst);
        self.job_tx.lock().expect("sender lock poisoned").take();

        let live: Vec<(TaskId, Arc<dyn Abortable>)> = {
            let mut registry = self.registry.lock().expect("registry lock poisoned");
            registry.drain().collect()
        };
        let mut never_ran = Vec::new();
        for (id, job) in live {
            if job.abort() {
                never_ran.push(id);
            }
        }
        info!(aborted = never_ran.len(), "worker pool halted");
        never_ran
    }

    /// True once shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// True once every worker has exited.
    pub fn is_terminated(&self) -> bool {
        *self.terminated.borrow()
    }

    /// Waits up to `timeout` for all workers to exit after a shutdown.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        let mut rx = self.terminated.clone();
        match tokio::time::timeout(timeout, rx.wait_for(|done| *done)).await {
            Ok(res) => res.is_ok(),
            Err(_) => false,
        }
    }
}

async fn worker_loop(worker: usize, job_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<PoolJob>>>) {
    debug!(worker, "worker started");
    loop {
        let job = {
            let mut rx = job_rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else { break };
        debug!(worker, task_id = %job.id, "job dequeued");
        (job.run)().await;
    }
    debug!(worker, "worker exited");
}

fn wrap_job<F>(
    fut: F,
    shared: Arc<ExecShared<F::Output>>,
    registry: Registry,
) -> Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    Box::new(move || {
        Box::pin(async move {
            let id = shared.id();
            if !shared.mark_running() {
                debug!(task_id = %id, "job cancelled before start");
                registry.lock().expect("registry lock poisoned").remove(&id);
                return;
            }
            let cancel = shared.cancel_token();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(task_id = %id, "job interrupted");
                    shared.mark_interrupted();
                }
                outcome = AssertUnwindSafe(fut).catch_unwind() => {
                    match outcome {
                        Ok(value) => shared.finish(Ok(value)),
                        Err(panic) => {
                            warn!(task_id = %id, "job panicked");
                            shared.finish(Err(ExecError::Panicked(panic_message(&panic))));
                        }
                    }
                }
            }
            registry.lock().expect("registry lock poisoned").remove(&id);
        })
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
