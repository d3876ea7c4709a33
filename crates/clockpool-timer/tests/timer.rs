use std::sync::{Arc, Mutex};
use std::time::Duration;

use clockpool_timer::{RegisterError, Timer, TimerJob, TriggerError};
use futures_util::future::BoxFuture;
use tokio::time::{Instant, advance, pause, sleep};

/// Records the elapsed time of every firing, optionally holding the
/// driver for `busy` per firing.
struct Recorder {
    start: Instant,
    ticks: Arc<Mutex<Vec<Duration>>>,
    busy: Duration,
}

impl Recorder {
    fn new(ticks: Arc<Mutex<Vec<Duration>>>) -> Arc<Self> {
        Self::busy_for(ticks, Duration::ZERO)
    }

    fn busy_for(ticks: Arc<Mutex<Vec<Duration>>>, busy: Duration) -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            ticks,
            busy,
        })
    }
}

impl TimerJob for Recorder {
    fn fire(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            self.ticks.lock().unwrap().push(self.start.elapsed());
            if !self.busy.is_zero() {
                sleep(self.busy).await;
            }
        })
    }
}

fn ticks() -> Arc<Mutex<Vec<Duration>>> {
    Arc::new(Mutex::new(Vec::new()))
}

const TOLERANCE: Duration = Duration::from_millis(100);

fn assert_tick(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual <= expected + TOLERANCE,
        "expected firing near {expected:?}, got {actual:?}"
    );
}

#[tokio::test]
async fn one_shot_fires_once_at_deadline() {
    pause();
    let timer = Timer::new();
    let ticks = ticks();
    let handle = timer
        .schedule_once(Recorder::new(ticks.clone()), Duration::from_secs(1))
        .unwrap();

    assert!(!handle.is_done());
    assert!(!handle.is_cancelled());

    handle.join().await.unwrap();

    assert!(handle.is_done());
    assert!(!handle.is_cancelled());
    let ticks = ticks.lock().unwrap();
    assert_eq!(ticks.len(), 1);
    assert_tick(ticks[0], Duration::from_secs(1));
}

#[tokio::test]
async fn zero_delay_fires_immediately() {
    pause();
    let timer = Timer::new();
    let ticks = ticks();
    let handle = timer
        .schedule_once(Recorder::new(ticks.clone()), Duration::ZERO)
        .unwrap();

    handle.join().await.unwrap();
    assert_tick(ticks.lock().unwrap()[0], Duration::ZERO);
}

#[tokio::test]
async fn remaining_delay_tracks_the_clock() {
    pause();
    let timer = Timer::new();
    let handle = timer
        .schedule_once(Recorder::new(ticks()), Duration::from_secs(10))
        .unwrap();

    assert_eq!(handle.remaining_delay(), Duration::from_secs(10));
    advance(Duration::from_secs(4)).await;
    assert_eq!(handle.remaining_delay(), Duration::from_secs(6));
}

#[tokio::test]
async fn cancel_before_fire_suppresses_the_firing() {
    pause();
    let timer = Timer::new();
    let ticks = ticks();
    let handle = timer
        .schedule_once(Recorder::new(ticks.clone()), Duration::from_secs(5))
        .unwrap();

    assert!(handle.cancel());
    assert!(handle.is_cancelled());
    assert!(handle.is_done());
    assert!(matches!(handle.join().await, Err(TriggerError::Cancelled)));

    sleep(Duration::from_secs(6)).await;
    assert!(ticks.lock().unwrap().is_empty());

    // cancelling again still reports cancelled
    assert!(handle.cancel());
}

#[tokio::test]
async fn cancel_after_completed_firing_fails() {
    pause();
    let timer = Timer::new();
    let handle = timer
        .schedule_once(Recorder::new(ticks()), Duration::from_millis(10))
        .unwrap();

    handle.join().await.unwrap();
    assert!(!handle.cancel());
    assert!(!handle.is_cancelled());
}

#[tokio::test]
async fn fixed_rate_rearms_from_the_previous_deadline() {
    pause();
    let timer = Timer::new();
    let ticks = ticks();
    let handle = timer
        .schedule_fixed_rate(
            Recorder::new(ticks.clone()),
            Duration::from_secs(2),
            Duration::from_secs(1),
        )
        .unwrap();

    sleep(Duration::from_millis(4100)).await;
    assert!(!handle.is_done());
    assert!(handle.cancel());

    {
        let ticks = ticks.lock().unwrap();
        assert_eq!(ticks.len(), 3);
        for (i, tick) in ticks.iter().enumerate() {
            assert_tick(*tick, Duration::from_secs(2 + i as u64));
        }
    }

    sleep(Duration::from_secs(3)).await;
    assert_eq!(ticks.lock().unwrap().len(), 3);
    assert!(handle.is_cancelled());
}

#[tokio::test]
async fn fixed_delay_measures_from_firing_completion() {
    pause();
    let timer = Timer::new();
    let ticks = ticks();
    // each firing holds the driver for 500ms, pushing later firings out
    let handle = timer
        .schedule_fixed_delay(
            Recorder::busy_for(ticks.clone(), Duration::from_millis(500)),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();

    sleep(Duration::from_millis(4200)).await;
    assert!(handle.cancel());

    let ticks = ticks.lock().unwrap();
    assert_eq!(ticks.len(), 3);
    assert_tick(ticks[0], Duration::from_millis(1000));
    assert_tick(ticks[1], Duration::from_millis(2500));
    assert_tick(ticks[2], Duration::from_millis(4000));
}

#[tokio::test]
async fn shutdown_lets_oneshots_fire_and_cancels_periodic() {
    pause();
    let timer = Timer::new();
    let ticks = ticks();
    let one = timer
        .schedule_once(Recorder::new(ticks.clone()), Duration::from_secs(2))
        .unwrap();
    let periodic = timer
        .schedule_fixed_rate(
            Recorder::new(ticks.clone()),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();

    timer.shutdown();
    assert!(timer.is_shutdown());
    assert!(matches!(
        timer.schedule_once(Recorder::new(ticks.clone()), Duration::ZERO),
        Err(RegisterError::Shutdown)
    ));

    // give the driver a beat to process the shutdown
    sleep(Duration::from_millis(1)).await;
    assert!(periodic.is_cancelled());

    one.join().await.unwrap();
    assert!(timer.await_termination(Duration::from_secs(1)).await);
    assert!(timer.is_terminated());

    let ticks = ticks.lock().unwrap();
    assert_eq!(ticks.len(), 1);
    assert_tick(ticks[0], Duration::from_secs(2));
}

#[tokio::test]
async fn shutdown_now_reports_unfired_registrations() {
    pause();
    let timer = Timer::new();
    let ticks = ticks();
    let a = timer
        .schedule_once(Recorder::new(ticks.clone()), Duration::from_secs(5))
        .unwrap();
    let b = timer
        .schedule_once(Recorder::new(ticks.clone()), Duration::from_secs(7))
        .unwrap();

    let unfired = timer.shutdown_now().await;
    assert_eq!(unfired.len(), 2);
    assert!(unfired.contains(&a.id()));
    assert!(unfired.contains(&b.id()));
    assert!(a.is_cancelled());
    assert!(b.is_cancelled());

    assert!(timer.await_termination(Duration::from_secs(1)).await);
    sleep(Duration::from_secs(8)).await;
    assert!(ticks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn await_termination_times_out_while_running() {
    pause();
    let timer = Timer::new();
    assert!(!timer.await_termination(Duration::from_millis(100)).await);
    assert!(!timer.is_terminated());
}
