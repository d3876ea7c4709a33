//! End-to-end demo: schedule one-shot and periodic work, cancel, shut
//! down.

use std::time::Duration;

use clockpool_core::{ClockPool, Timer, WorkerPool};
use tokio::time::sleep;
use tracing::info;

use tracing_subscriber::{EnvFilter, fmt};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    info!("starting clockpool demo");

    let executor = ClockPool::new(Timer::new(), WorkerPool::new(4));

    let once = executor
        .schedule_once(
            async {
                info!("one-shot job ran");
                6 * 7
            },
            Duration::from_millis(500),
        )
        .expect("executor accepts work");

    let ticker = executor
        .schedule_fixed_rate(
            || async {
                info!("periodic job ran");
            },
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .expect("executor accepts work");

    let delay = once.remaining_delay().await;
    info!(delay_ms = delay.as_millis(), "one-shot pending");

    let answer = once.join().await.expect("one-shot completes");
    info!(answer, "one-shot result");

    sleep(Duration::from_millis(3500)).await;

    let cancelled = ticker.cancel(false).await;
    info!(cancelled, "periodic job cancelled");

    executor.shutdown();
    let terminated = executor.await_termination(Duration::from_secs(5)).await;
    info!(terminated, "executor shut down");
}
