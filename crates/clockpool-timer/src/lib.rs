//! Trigger service: decides *when* a job fires.
//!
//! A single driver task owns a [`tokio_util::time::DelayQueue`] and fires
//! registered jobs at their due time, one-shot or periodically. Callers hold
//! a [`TriggerHandle`] to query, cancel or wait on a registration. Where a
//! job *runs* is none of this crate's business; see `clockpool-pool`.

pub mod errors;
pub mod service;
pub mod trigger;

pub use errors::{RegisterError, TriggerError};
pub use service::{Timer, TimerJob};
pub use trigger::{TriggerHandle, TriggerId};
