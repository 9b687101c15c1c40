//! Supervision strategies of long-running units, mapped onto taskvisor
//! policies by the runtime.
mod admission;
mod backoff;
mod jitter;
mod restart;

pub use admission::AdmissionStrategy;
pub use backoff::BackoffStrategy;
pub use jitter::JitterStrategy;
pub use restart::RestartStrategy;
