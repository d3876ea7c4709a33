//! Split-phase scheduled execution.
//!
//! A scheduled job lives in two phases: a *trigger* phase on the timer
//! service (when to fire) and an *execution* phase on the worker pool
//! (where to run). [`ClockPool`] wires the two together and hands callers
//! a [`JobHandle`] that presents both phases behind one future-like
//! contract, so the pool's size can change without touching the clock.
//!
//! ```no_run
//! use std::time::Duration;
//! use clockpool_core::{ClockPool, Timer, WorkerPool};
//!
//! # async fn demo() {
//! let executor = ClockPool::new(Timer::new(), WorkerPool::new(4));
//! let job = executor
//!     .schedule_once(async { 42 }, Duration::from_millis(500))
//!     .unwrap();
//! assert_eq!(job.join().await.unwrap(), 42);
//! # }
//! ```

mod adapter;
pub mod budget;
pub mod errors;
pub mod executor;
pub mod handle;

pub use budget::{Precision, WaitBudget};
pub use errors::{JoinError, ScheduleError};
pub use executor::{AbortedTask, ClockPool};
pub use handle::JobHandle;

pub use clockpool_pool::{ExecError, ExecHandle, TaskId, WorkerPool};
pub use clockpool_timer::{Timer, TriggerHandle, TriggerId};
