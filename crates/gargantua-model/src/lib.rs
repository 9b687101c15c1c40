//! Resource model of the Gargantua control plane.
//!
//! Plain data: kinds, metadata, labels, selectors, wall-clock parsing, cost
//! arithmetic and the strategies used to supervise long-running units. No I/O.
mod domain;
pub use domain::*;

mod error;
pub use error::{ModelError, ModelResult};

mod kind;
pub use kind::*;

pub mod cost;
pub use cost::{CostReport, CostSource, CostView, TimeUnit};

mod strategy;
pub use strategy::{AdmissionStrategy, BackoffStrategy, JitterStrategy, RestartStrategy};
