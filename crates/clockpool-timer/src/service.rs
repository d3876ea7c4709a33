//! The [`Timer`] service and its driver loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::time::DelayQueue;
use tokio_util::time::delay_queue::Key;
use tracing::{debug, info};

use crate::errors::RegisterError;
use crate::trigger::{TriggerHandle, TriggerId, TriggerShared};

/// A unit of work the timer fires at its due time.
///
/// Firings are awaited inline on the driver task, so implementations must
/// return quickly; a slow `fire` delays every later trigger. Work that
/// takes real time belongs on a pool, not in here.
pub trait TimerJob: Send + Sync + 'static {
    /// Runs one firing.
    fn fire(self: Arc<Self>) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Repeat {
    Once,
    FixedRate(Duration),
    FixedDelay(Duration),
}

pub(crate) struct TimerEntry {
    job: Arc<dyn TimerJob>,
    shared: Arc<TriggerShared>,
    repeat: Repeat,
}

pub(crate) enum TimerCommand {
    Register(TimerEntry),
    Cancel(TriggerId),
    Shutdown,
    ShutdownNow { reply: oneshot::Sender<Vec<TriggerId>> },
}

/// The delay/periodic trigger service.
pub struct Timer {
    cmd_tx: mpsc::UnboundedSender<TimerCommand>,
    shutdown: AtomicBool,
    terminated: watch::Receiver<bool>,
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("shutdown", &self.is_shutdown())
            .field("terminated", &self.is_terminated())
            .finish_non_exhaustive()
    }
}

impl Timer {
    /// Spawns the driver task. Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (terminated_tx, terminated) = watch::channel(false);
        tokio::spawn(driver_loop(cmd_rx, terminated_tx));
        Self {
            cmd_tx,
            shutdown: AtomicBool::new(false),
            terminated,
        }
    }

    /// Fires `job` once after `delay`.
    pub fn schedule_once(
        &self,
        job: Arc<dyn TimerJob>,
        delay: Duration,
    ) -> Result<TriggerHandle, RegisterError> {
        self.register(job, delay, Repeat::Once)
    }

    /// Fires `job` after `initial_delay`, then every `period` measured
    /// from the previous due time. Late firings re-arm in the past and
    /// catch up.
    pub fn schedule_fixed_rate(
        &self,
        job: Arc<dyn TimerJob>,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<TriggerHandle, RegisterError> {
        self.register(job, initial_delay, Repeat::FixedRate(period))
    }

    /// Fires `job` after `initial_delay`, then every `delay` measured
    /// from the completion of the previous firing.
    pub fn schedule_fixed_delay(
        &self,
        job: Arc<dyn TimerJob>,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<TriggerHandle, RegisterError> {
        self.register(job, initial_delay, Repeat::FixedDelay(delay))
    }

    fn register(
        &self,
        job: Arc<dyn TimerJob>,
        initial_delay: Duration,
        repeat: Repeat,
    ) -> Result<TriggerHandle, RegisterError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(RegisterError::Shutdown);
        }
        let id = TriggerId::new();
        let deadline = Instant::now() + initial_delay;
        let shared = Arc::new(TriggerShared::new(id, deadline));
        let entry = TimerEntry {
            job,
            shared: shared.clone(),
            repeat,
        };
        self.cmd_tx
            .send(TimerCommand::Register(entry))
            .map_err(|_| RegisterError::Shutdown)?;
        debug!(trigger_id = %id, delay_ms = initial_delay.as_millis(), "trigger registered");
        Ok(TriggerHandle {
            shared,
            cmd_tx: self.cmd_tx.clone(),
        })
    }

    /// Stops accepting registrations. Already-scheduled one-shots still
    /// fire; periodic registrations are cancelled.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("timer shutdown initiated");
        let _ = self.cmd_tx.send(TimerCommand::Shutdown);
    }

    /// Stops the driver immediately; returns ids of registrations that
    /// never fired.
    pub async fn shutdown_now(&self) -> Vec<TriggerId> {
        self.shutdown.store(true, Ordering::SeqCst);
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(TimerCommand::ShutdownNow { reply })
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// True once shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// True once the driver task has exited.
    pub fn is_terminated(&self) -> bool {
        *self.terminated.borrow()
    }

    /// Waits up to `timeout` for the driver to exit after a shutdown.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        let mut rx = self.terminated.clone();
        match tokio::time::timeout(timeout, rx.wait_for(|done| *done)).await {
            Ok(res) => res.is_ok(),
            Err(_) => false,
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

struct DriverEntry {
    job: Arc<dyn TimerJob>,
    shared: Arc<TriggerShared>,
    repeat: Repeat,
    key: Key,
}

async fn driver_loop(
    mut cmd_rx: mpsc::UnboundedReceiver<TimerCommand>,
    terminated_tx: watch::Sender<bool>,
) {
    let mut queue: DelayQueue<TriggerId> = DelayQueue::new();
    let mut entries: HashMap<TriggerId, DriverEntry> = HashMap::new();
    let mut draining = false;

    info!("timer driver started");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(TimerCommand::Register(entry)) => {
                    if draining {
                        entry.shared.mark_cancelled();
                    } else {
                        let id = entry.shared.id();
                        let key = queue.insert_at(id, entry.shared.deadline());
                        entries.insert(id, DriverEntry {
                            job: entry.job,
                            shared: entry.shared,
                            repeat: entry.repeat,
                            key,
                        });
                    }
                }
                Some(TimerCommand::Cancel(id)) => {
                    if let Some(entry) = entries.remove(&id) {
                        let _ = queue.try_remove(&entry.key);
                        debug!(trigger_id = %id, "trigger dropped from queue");
                    }
                    if draining && entries.is_empty() {
                        break;
                    }
                }
                Some(TimerCommand::Shutdown) => {
                    draining = true;
                    // periodic registrations do not survive shutdown
                    let periodic: Vec<TriggerId> = entries
                        .iter()
                        .filter(|(_, entry)| entry.repeat != Repeat::Once)
                        .map(|(id, _)| *id)
                        .collect();
                    for id in periodic {
                        if let Some(entry) = entries.remove(&id) {
                            let _ = queue.try_remove(&entry.key);
                            entry.shared.mark_cancelled();
                        }
                    }
                    if entries.is_empty() {
                        break;
                    }
                }
                Some(TimerCommand::ShutdownNow { reply }) => {
                    let mut unfired = Vec::with_capacity(entries.len());
                    for (id, entry) in entries.drain() {
                        let _ = queue.try_remove(&entry.key);
                        entry.shared.mark_cancelled();
                        unfired.push(id);
                    }
                    let _ = reply.send(unfired);
                    break;
                }
                None => break,
            },
            Some(expired) = queue.next() => {
                let id = expired.into_inner();
                fire(&mut queue, &mut entries, id).await;
                if draining && entries.is_empty() {
                    break;
                }
            }
        }
    }

    info!("timer driver exited");
    terminated_tx.send_replace(true);
}

async fn fire(
    queue: &mut DelayQueue<TriggerId>,
    entries: &mut HashMap<TriggerId, DriverEntry>,
    id: TriggerId,
) {
    let (job, shared, repeat) = match entries.get(&id) {
        Some(entry) => (entry.job.clone(), entry.shared.clone(), entry.repeat),
        None => return,
    };
    if shared.is_cancelled() {
        entries.remove(&id);
        return;
    }

    debug!(trigger_id = %id, "trigger fired");
    job.fire().await;

    // a cancel may have landed while the firing ran
    if shared.is_cancelled() {
        entries.remove(&id);
        return;
    }
    match repeat {
        Repeat::Once => {
            entries.remove(&id);
            shared.mark_done();
        }
        Repeat::FixedRate(period) => {
            let next = shared.deadline() + period;
            rearm(queue, entries, id, next);
        }
        Repeat::FixedDelay(delay) => {
            let next = Instant::now() + delay;
            rearm(queue, entries, id, next);
        }
    }
}

fn rearm(
    queue: &mut DelayQueue<TriggerId>,
    entries: &mut HashMap<TriggerId, DriverEntry>,
    id: TriggerId,
    next: Instant,
) {
    if let Some(entry) = entries.get_mut(&id) {
        entry.shared.set_deadline(next);
        entry.key = queue.insert_at(id, next);
    }
}
