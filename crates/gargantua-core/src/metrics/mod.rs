//! Controller metrics behind a trait.
//!
//! The runtime reports reconcile outcomes, backoff requeues and queue depth;
//! the claim controller reports placement decisions. The binary plugs in the
//! prometheus backend, tests use [`noop_metrics`].
mod backend;
mod noop;

use std::sync::Arc;

pub use backend::{MetricsBackend, MetricsHandle, PlacementOutcome, ReconcileOutcome};
pub use noop::NoOpMetrics;

pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoOpMetrics)
}
