use std::sync::Arc;

/// Reconcile outcome for metrics classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Reconcile finished with nothing scheduled.
    Success,
    /// Reconcile finished and asked to run again later.
    Requeue,
    /// Reconcile returned an error.
    Error,
    /// Reconcile panicked.
    Panic,
}

impl ReconcileOutcome {
    /// Return label value for metrics.
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Success => "success",
            ReconcileOutcome::Requeue => "requeue",
            ReconcileOutcome::Error => "error",
            ReconcileOutcome::Panic => "panic",
        }
    }
}

/// Placement attempt result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// Every VM of the claim fits one DBC.
    Single,
    /// VMs were spread across several environments.
    Split,
    /// At least one VM could not be placed.
    Failed,
}

impl PlacementOutcome {
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            PlacementOutcome::Single => "single",
            PlacementOutcome::Split => "split",
            PlacementOutcome::Failed => "failed",
        }
    }
}

/// Backend metrics collection interface.
///
/// Implementations are injected into every controller and shared by all workers.
pub trait MetricsBackend: Send + Sync + 'static {
    /// Record one finished reconcile of `controller`.
    fn record_reconcile(&self, controller: &str, outcome: ReconcileOutcome, duration_ms: u64);
    /// Record a backoff re-enqueue; `reason` is the error kind.
    fn record_requeue(&self, controller: &str, reason: &str);
    /// Record the number of keys waiting in the queue of `controller`.
    fn record_queue_depth(&self, controller: &str, depth: usize);
    /// Record a placement planner decision.
    fn record_placement(&self, outcome: PlacementOutcome);
}

/// Shared handle to metrics backend.
pub type MetricsHandle = Arc<dyn MetricsBackend>;
