//! Bulk message dispatch pipeline.
//!
//! Leaves first: [`rate_limiter`] and [`retry`] have no dependencies,
//! [`sender`] wraps a transport with the retry policy, [`pool`] runs sends
//! concurrently behind the shared limiter, and [`dispatcher`] drives batches
//! through the pool.

pub mod dispatcher;
pub mod pool;
pub mod rate_limiter;
pub mod retry;
pub mod sender;

pub use dispatcher::{BATCH_PROCESSED_METRIC, BatchDispatcher, RunSummary};
pub use pool::{DrainReport, WorkerPool};
pub use rate_limiter::{RateLimiter, TokenBucket};
pub use retry::{RetryDecision, RetryPolicy};
pub use sender::{SendSuccess, Sender};
