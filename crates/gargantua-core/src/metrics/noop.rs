use crate::metrics::backend::{MetricsBackend, PlacementOutcome, ReconcileOutcome};

/// Discards every measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsBackend for NoOpMetrics {
    fn record_reconcile(&self, _controller: &str, _outcome: ReconcileOutcome, _duration_ms: u64) {}

    fn record_requeue(&self, _controller: &str, _reason: &str) {}

    fn record_queue_depth(&self, _controller: &str, _depth: usize) {}

    fn record_placement(&self, _outcome: PlacementOutcome) {}
}
