use std::sync::Arc;

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGaugeVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

use gargantua_core::metrics::{MetricsBackend, PlacementOutcome, ReconcileOutcome};

const NAMESPACE: &str = "gargantua";

/// Controller metrics registered on a prometheus [`Registry`].
///
/// Label values are bounded: controller names are fixed, outcomes and error
/// kinds are enums.
#[derive(Clone)]
pub struct PrometheusMetrics {
    reconciles: CounterVec,
    reconcile_duration: HistogramVec,
    requeues: CounterVec,
    queue_depth: IntGaugeVec,
    placements: CounterVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let reconciles = CounterVec::new(
            Opts::new("reconcile_total", "Finished reconciles by outcome").namespace(NAMESPACE),
            &["controller", "outcome"],
        )?;
        registry.register(Box::new(reconciles.clone()))?;

        let reconcile_duration = HistogramVec::new(
            HistogramOpts::new("reconcile_duration_seconds", "Reconcile wall time")
                .namespace(NAMESPACE)
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["controller"],
        )?;
        registry.register(Box::new(reconcile_duration.clone()))?;

        let requeues = CounterVec::new(
            Opts::new("requeue_total", "Keys re-enqueued with backoff").namespace(NAMESPACE),
            &["controller", "reason"],
        )?;
        registry.register(Box::new(requeues.clone()))?;

        let queue_depth = IntGaugeVec::new(
            Opts::new("queue_depth", "Keys waiting in a controller queue").namespace(NAMESPACE),
            &["controller"],
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        let placements = CounterVec::new(
            Opts::new("placement_total", "Dynamic placement decisions").namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(placements.clone()))?;

        Ok(Self {
            reconciles,
            reconcile_duration,
            requeues,
            queue_depth,
            placements,
            registry,
        })
    }

    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Render every metric in the text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_reconcile(&self, controller: &str, outcome: ReconcileOutcome, duration_ms: u64) {
        self.reconciles
            .with_label_values(&[controller, outcome.as_label()])
            .inc();
        self.reconcile_duration
            .with_label_values(&[controller])
            .observe(duration_ms as f64 / 1000.0);
    }

    fn record_requeue(&self, controller: &str, reason: &str) {
        self.requeues.with_label_values(&[controller, reason]).inc();
    }

    fn record_queue_depth(&self, controller: &str, depth: usize) {
        self.queue_depth
            .with_label_values(&[controller])
            .set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    fn record_placement(&self, outcome: PlacementOutcome) {
        self.placements.with_label_values(&[outcome.as_label()]).inc();
    }
}
