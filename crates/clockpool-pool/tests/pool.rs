use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use clockpool_pool::{ExecError, SubmitError, WorkerPool};
use tokio::time::{pause, sleep};

#[tokio::test]
async fn submit_and_join_returns_the_result() {
    let pool = WorkerPool::new(2);
    let handle = pool.submit(async { "done" }).unwrap();

    assert_eq!(handle.join().await.unwrap(), "done");
    assert!(handle.is_done());
    assert!(!handle.is_cancelled());

    // results are retrievable repeatedly
    assert_eq!(handle.join().await.unwrap(), "done");
}

#[tokio::test]
async fn cancel_queued_job_prevents_it_from_running() {
    pause();
    let pool = WorkerPool::new(1);

    let blocker = pool
        .submit(async {
            sleep(Duration::from_secs(1)).await;
        })
        .unwrap();

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    let queued = pool
        .submit(async move {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    assert!(queued.cancel(false));
    assert!(queued.is_cancelled());
    assert!(queued.is_done());
    assert!(matches!(queued.join().await, Err(ExecError::Cancelled)));

    blocker.join().await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn running_job_needs_interrupt_to_cancel() {
    pause();
    let pool = WorkerPool::new(1);

    let started = Arc::new(AtomicBool::new(false));
    let flag = started.clone();
    let handle = pool
        .submit(async move {
            flag.store(true, Ordering::SeqCst);
            sleep(Duration::from_secs(1000)).await;
        })
        .unwrap();

    sleep(Duration::from_millis(1)).await;
    assert!(started.load(Ordering::SeqCst));

    assert!(!handle.cancel(false));
    assert!(!handle.is_done());

    assert!(handle.cancel(true));
    assert!(matches!(handle.join().await, Err(ExecError::Cancelled)));
    assert!(handle.is_cancelled());
    assert!(handle.is_done());
}

#[tokio::test]
async fn panicking_job_surfaces_at_join_and_spares_the_worker() {
    let pool = WorkerPool::new(1);

    let boom = pool
        .submit(async {
            panic!("boom");
        })
        .unwrap();
    match boom.join().await {
        Err(ExecError::Panicked(message)) => assert!(message.contains("boom")),
        other => panic!("expected a panic outcome, got {other:?}"),
    }
    assert!(boom.is_done());
    assert!(!boom.is_cancelled());

    let ok = pool.submit(async { 7 }).unwrap();
    assert_eq!(ok.join().await.unwrap(), 7);
}

#[tokio::test]
async fn graceful_shutdown_drains_queued_work() {
    pause();
    let pool = WorkerPool::new(1);
    let counter = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let counter = counter.clone();
        pool.submit(async move {
            sleep(Duration::from_millis(10)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    pool.shutdown();
    assert!(pool.is_shutdown());
    assert!(matches!(pool.submit(async {}), Err(SubmitError::Shutdown)));

    assert!(pool.await_termination(Duration::from_secs(5)).await);
    assert!(pool.is_terminated());
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn shutdown_now_aborts_queued_and_interrupts_running() {
    pause();
    let pool = WorkerPool::new(1);

    let started = Arc::new(AtomicBool::new(false));
    let flag = started.clone();
    let running = pool
        .submit(async move {
            flag.store(true, Ordering::SeqCst);
            sleep(Duration::from_secs(1000)).await;
        })
        .unwrap();
    sleep(Duration::from_millis(1)).await;
    assert!(started.load(Ordering::SeqCst));

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    let queued = pool
        .submit(async move {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    let aborted = pool.shutdown_now();
    assert_eq!(aborted, vec![queued.id()]);

    assert!(matches!(running.join().await, Err(ExecError::Cancelled)));
    assert!(matches!(queued.join().await, Err(ExecError::Cancelled)));
    assert!(pool.await_termination(Duration::from_secs(1)).await);
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn await_termination_times_out_while_running() {
    pause();
    let pool = WorkerPool::new(2);
    assert!(!pool.await_termination(Duration::from_millis(100)).await);
    assert!(!pool.is_terminated());
}
