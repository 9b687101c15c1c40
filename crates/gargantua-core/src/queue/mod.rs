//! Deduplicating work queues.
//!
//! [`WorkQueue`] is the plain FIFO: a key is held at most once while waiting
//! and is never handed to two workers at the same time. [`RateLimitingQueue`]
//! adds delayed and per-key exponential-backoff re-enqueue on top.
mod fifo;
pub use fifo::WorkQueue;

mod limiter;
pub use limiter::ExponentialLimiter;

mod rate_limited;
pub use rate_limited::RateLimitingQueue;
