use std::{sync::Arc, time::Duration};

use gargantua_core::{
    clock::ClockHandle, informer::InformerSet, metrics::MetricsHandle, runtime::ControllerSettings,
    shard::Shard, store::Store,
};
use gargantua_model::DEFAULT_NAMESPACE;

use crate::{access::AccessCodeResolver, capacity::CapacityAccountant};

/// Tunables shared by every controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub namespace: String,
    /// Base name of VMs materialised from VMSets.
    pub scheduled_prefix: String,
    /// Base name of dynamically placed VMs.
    pub dynamic_prefix: String,
    /// Static bind attempts before the claim falls back or fails.
    pub static_bind_threshold: u32,
    /// Delay between static bind attempts.
    pub static_bind_retry: Duration,
    /// Requeue interval while an event waits for its VMSets.
    pub verify_requeue: Duration,
    /// Requeue interval while a bound claim waits for its VMs to run.
    pub ready_poll: Duration,
    pub password_reset_ttl: Duration,
    /// Used when the retention setting is missing or invalid.
    pub default_retention_hours: i64,
    pub workers: usize,
    pub shard: Shard,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            scheduled_prefix: "scheduled".to_string(),
            dynamic_prefix: "dynamic".to_string(),
            static_bind_threshold: 3,
            static_bind_retry: Duration::from_secs(5),
            verify_requeue: Duration::from_secs(10),
            ready_poll: Duration::from_secs(30),
            password_reset_ttl: Duration::from_secs(60 * 60),
            default_retention_hours: 24,
            workers: 2,
            shard: Shard::single(),
        }
    }
}

impl ControllerConfig {
    /// Worker settings for controllers that run on a single replica.
    pub fn unsharded(&self) -> ControllerSettings {
        ControllerSettings {
            workers: self.workers,
            shard: Shard::single(),
        }
    }

    /// Worker settings for controllers that split keys across replicas.
    pub fn sharded(&self) -> ControllerSettings {
        ControllerSettings {
            workers: self.workers,
            shard: self.shard,
        }
    }
}

/// Everything a reconciler reads or writes.
pub struct Context {
    pub store: Store,
    pub informers: InformerSet,
    pub clock: ClockHandle,
    pub config: ControllerConfig,
    pub metrics: MetricsHandle,
    pub capacity: CapacityAccountant,
    pub resolver: AccessCodeResolver,
}

impl Context {
    pub fn new(
        store: Store,
        informers: InformerSet,
        clock: ClockHandle,
        config: ControllerConfig,
        metrics: MetricsHandle,
    ) -> Arc<Self> {
        let capacity = CapacityAccountant::new(informers.vms.lister());
        let resolver = AccessCodeResolver::new(
            informers.access_codes.lister(),
            informers.otacs.lister(),
            informers.events.lister(),
            clock.clone(),
        );
        Arc::new(Self {
            store,
            informers,
            clock,
            config,
            metrics,
            capacity,
            resolver,
        })
    }

    pub fn ns(&self) -> &str {
        &self.config.namespace
    }
}
