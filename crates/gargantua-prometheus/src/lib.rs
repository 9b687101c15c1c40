//! Prometheus backend for the controller metrics of Gargantua.
//!
//! [`PrometheusMetrics`] implements [`gargantua_core::metrics::MetricsBackend`];
//! hand it to the controllers and serve [`PrometheusMetrics::encode`] from an
//! HTTP endpoint.
//!
//! ```rust
//! use std::sync::Arc;
//! use gargantua_core::metrics::{MetricsBackend, MetricsHandle, ReconcileOutcome};
//! use gargantua_prometheus::PrometheusMetrics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let handle: MetricsHandle = Arc::new(metrics.clone());
//! handle.record_reconcile("scheduledevent", ReconcileOutcome::Success, 4);
//!
//! let body = metrics.encode()?;
//! assert!(body.contains("gargantua_reconcile_total"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `gargantua_reconcile_total{controller, outcome}`
//! - `gargantua_reconcile_duration_seconds{controller}`
//! - `gargantua_requeue_total{controller, reason}`
//! - `gargantua_queue_depth{controller}`
//! - `gargantua_placement_total{outcome}`
mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
