use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::{Action, ErrorPolicy, QueueHandle, Reconciler, Runnable};
use crate::{
    error::CoreError,
    informer::{SyncSignal, wait_for_sync},
    metrics::{MetricsHandle, ReconcileOutcome},
    queue::RateLimitingQueue,
    shard::Shard,
};

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Workers sharing the queue.
    pub workers: usize,
    /// Keys this replica owns.
    pub shard: Shard,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            shard: Shard::single(),
        }
    }
}

/// Worker pool draining one rate-limited queue into a [`Reconciler`].
///
/// Each reconcile runs on its own task, so a panic is contained, logged and
/// the key re-enqueued with backoff.
pub struct Controller<R: Reconciler> {
    reconciler: Arc<R>,
    queue: Arc<RateLimitingQueue>,
    settings: ControllerSettings,
    metrics: MetricsHandle,
    sync: Vec<SyncSignal>,
}

impl<R: Reconciler> Controller<R> {
    pub fn new(reconciler: Arc<R>, settings: ControllerSettings, metrics: MetricsHandle) -> Self {
        Self {
            reconciler,
            queue: Arc::new(RateLimitingQueue::default()),
            settings,
            metrics,
            sync: Vec::new(),
        }
    }

    /// Caches that must be synced before workers start.
    pub fn with_sync(mut self, signals: Vec<SyncSignal>) -> Self {
        self.sync = signals;
        self
    }

    pub fn handle(&self) -> QueueHandle {
        QueueHandle::new(self.queue.clone(), self.settings.shard)
    }

    pub fn reconciler(&self) -> &Arc<R> {
        &self.reconciler
    }

    async fn worker(&self, id: usize) {
        let name = self.reconciler.name();
        debug!(controller = name, worker = id, "worker started");
        while let Some(key) = self.queue.get().await {
            self.process(&key).await;
            self.queue.done(&key);
            self.metrics.record_queue_depth(name, self.queue.len());
        }
        debug!(controller = name, worker = id, "worker stopped");
    }

    async fn process(&self, key: &str) {
        let name = self.reconciler.name();
        let started = Instant::now();

        let reconciler = self.reconciler.clone();
        let owned = key.to_string();
        let span = info_span!("reconcile", controller = name, key = %key);
        let joined = tokio::spawn(async move { reconciler.reconcile(&owned).await }.instrument(span)).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let outcome = match joined {
            Ok(Ok(Action::Done)) => {
                self.queue.forget(key);
                ReconcileOutcome::Success
            }
            Ok(Ok(Action::RequeueAfter(delay))) => {
                self.queue.forget(key);
                self.queue.add_after(key, delay);
                debug!(controller = name, key, delay_ms = delay.as_millis() as u64, "requeue scheduled");
                ReconcileOutcome::Requeue
            }
            Ok(Err(e)) => {
                match e.policy() {
                    ErrorPolicy::Forget => {
                        if e.kind() == "not_found" {
                            debug!(controller = name, key, error = %e, "object gone");
                        } else {
                            warn!(controller = name, key, error = %e, "reconcile failed, not retrying");
                        }
                        self.queue.forget(key);
                    }
                    ErrorPolicy::Backoff => {
                        let delay = self.queue.add_rate_limited(key);
                        warn!(
                            controller = name,
                            key,
                            error = %e,
                            attempt = self.queue.retries(key),
                            delay_ms = delay.as_millis() as u64,
                            "reconcile failed, retrying"
                        );
                        self.metrics.record_requeue(name, e.kind());
                    }
                }
                ReconcileOutcome::Error
            }
            Err(join) => {
                let delay = self.queue.add_rate_limited(key);
                error!(
                    controller = name,
                    key,
                    error = %join,
                    delay_ms = delay.as_millis() as u64,
                    "reconcile panicked"
                );
                self.metrics.record_requeue(name, "panic");
                ReconcileOutcome::Panic
            }
        };
        self.metrics.record_reconcile(name, outcome, elapsed_ms);
    }
}

#[async_trait]
impl<R: Reconciler> Runnable for Controller<R> {
    fn name(&self) -> String {
        format!("controller/{}", self.reconciler.name())
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), CoreError> {
        let name = self.reconciler.name();
        if !wait_for_sync(self.sync.clone(), &cancel).await {
            return Err(CoreError::NotSynced);
        }
        info!(
            controller = name,
            workers = self.settings.workers,
            shard = %self.settings.shard,
            "controller started"
        );

        let mut workers = JoinSet::new();
        for id in 0..self.settings.workers.max(1) {
            let this = self.clone();
            workers.spawn(async move { this.worker(id).await });
        }

        cancel.cancelled().await;
        self.queue.shutdown();
        while let Some(res) = workers.join_next().await {
            if let Err(e) = res {
                error!(controller = name, error = %e, "worker task failed");
            }
        }
        info!(controller = name, "controller stopped");
        Ok(())
    }
}
