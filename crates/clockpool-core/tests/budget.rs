use std::time::Duration;

use clockpool_core::{Precision, WaitBudget};
use tokio::time::{advance, pause};

#[test]
fn sub_millisecond_timeouts_select_fine_precision() {
    assert_eq!(
        WaitBudget::new(Duration::from_nanos(1)).precision(),
        Precision::Fine
    );
    assert_eq!(
        WaitBudget::new(Duration::from_micros(1)).precision(),
        Precision::Fine
    );
    assert_eq!(
        WaitBudget::new(Duration::from_micros(1500)).precision(),
        Precision::Fine
    );
}

#[test]
fn millisecond_and_coarser_timeouts_select_coarse_precision() {
    assert_eq!(
        WaitBudget::new(Duration::from_millis(1)).precision(),
        Precision::Coarse
    );
    assert_eq!(
        WaitBudget::new(Duration::from_millis(1500)).precision(),
        Precision::Coarse
    );
    assert_eq!(
        WaitBudget::new(Duration::from_secs(1)).precision(),
        Precision::Coarse
    );
    assert_eq!(
        WaitBudget::new(Duration::from_secs(60)).precision(),
        Precision::Coarse
    );
    assert_eq!(WaitBudget::new(Duration::ZERO).precision(), Precision::Coarse);
}

#[tokio::test]
async fn zero_budget_stays_zero_without_sampling() {
    pause();
    let mut budget = WaitBudget::new(Duration::ZERO);

    assert_eq!(budget.start(), Duration::ZERO);
    assert!(budget.is_exhausted());

    advance(Duration::from_secs(10)).await;
    assert_eq!(budget.remaining(), Duration::ZERO);
    assert_eq!(budget.remaining(), Duration::ZERO);
}

#[tokio::test]
async fn budget_shrinks_across_sequential_waits() {
    pause();
    let mut budget = WaitBudget::new(Duration::from_secs(100));

    assert_eq!(budget.start(), Duration::from_secs(100));
    advance(Duration::from_secs(10)).await;
    assert_eq!(budget.remaining(), Duration::from_secs(90));
    advance(Duration::from_secs(40)).await;
    assert_eq!(budget.remaining(), Duration::from_secs(50));
    advance(Duration::from_secs(50)).await;
    assert_eq!(budget.remaining(), Duration::ZERO);
}

#[tokio::test]
async fn overshoot_clamps_to_zero_and_sticks() {
    pause();
    let mut budget = WaitBudget::new(Duration::from_secs(5));

    budget.start();
    advance(Duration::from_secs(7)).await;
    assert_eq!(budget.remaining(), Duration::ZERO);
    assert!(budget.is_exhausted());

    advance(Duration::from_secs(7)).await;
    assert_eq!(budget.remaining(), Duration::ZERO);
}

#[tokio::test]
async fn coarse_precision_quantizes_elapsed_time_to_millis() {
    pause();
    let mut budget = WaitBudget::new(Duration::from_millis(10));

    budget.start();
    advance(Duration::from_micros(2500)).await;
    // 2.5ms of wall time reads as 2ms on the coarse clock
    assert_eq!(budget.remaining(), Duration::from_millis(8));
}

#[tokio::test]
async fn fine_precision_keeps_sub_millisecond_elapsed_time() {
    pause();
    let mut budget = WaitBudget::new(Duration::from_micros(10_500));

    budget.start();
    advance(Duration::from_micros(2_500)).await;
    assert_eq!(budget.remaining(), Duration::from_micros(8_000));
}

#[tokio::test]
async fn consulting_before_start_begins_the_measurement() {
    pause();
    let mut budget = WaitBudget::new(Duration::from_secs(10));

    assert_eq!(budget.remaining(), Duration::from_secs(10));
    advance(Duration::from_secs(4)).await;
    assert_eq!(budget.remaining(), Duration::from_secs(6));
}
