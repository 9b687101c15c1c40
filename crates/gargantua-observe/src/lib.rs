//! Logging for the Gargantua control plane.
//!
//! [`init_logger`] installs the global `tracing` subscriber. With the
//! `subscriber` feature, [`SupervisorLog`] turns taskvisor lifecycle events of
//! informers and controllers into log records.
mod logger;
pub use logger::*;

#[cfg(feature = "subscriber")]
mod subscriber;
#[cfg(feature = "subscriber")]
pub use subscriber::*;
