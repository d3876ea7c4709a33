//! Worker pool: decides *where* a job runs.
//!
//! A fixed number of worker tasks drain one shared queue. Every submitted
//! job gets an [`ExecHandle`] with the usual future surface: cancel,
//! done/cancelled queries and repeated result retrieval. Job failures
//! (panics) are isolated and surface only when a caller asks for the
//! result.

pub mod errors;
pub mod exec;
pub mod ids;
pub mod pool;

pub use errors::{ExecError, SubmitError};
pub use exec::ExecHandle;
pub use ids::TaskId;
pub use pool::WorkerPool;
