use std::{sync::Arc, time::Duration};

use gargantua_model::{
    AccessCode, Cost, DynamicBindConfiguration, Environment, OneTimeAccessCode, PasswordResetToken,
    Progress, Resource, ScheduledEvent, Session, Setting, VirtualMachine, VirtualMachineClaim,
    VirtualMachineSet,
};
use tokio_util::sync::CancellationToken;

use super::{DEFAULT_RESYNC, Informer, MetaInformer, SyncSignal, wait_for_sync};
use crate::{
    runtime::Runnable,
    store::{Api, ApiHandle, ListParams, Store},
};

/// One shared informer per kind, scoped to a namespace.
#[derive(Clone)]
pub struct InformerSet {
    pub events: Arc<Informer<ScheduledEvent>>,
    pub vm_sets: Arc<Informer<VirtualMachineSet>>,
    pub dbcs: Arc<Informer<DynamicBindConfiguration>>,
    pub vms: Arc<Informer<VirtualMachine>>,
    pub claims: Arc<Informer<VirtualMachineClaim>>,
    pub access_codes: Arc<Informer<AccessCode>>,
    pub otacs: Arc<Informer<OneTimeAccessCode>>,
    pub sessions: Arc<Informer<Session>>,
    pub tokens: Arc<Informer<PasswordResetToken>>,
    pub costs: Arc<Informer<Cost>>,
    pub environments: Arc<Informer<Environment>>,
    pub settings: Arc<Informer<Setting>>,
    pub progress: Arc<Informer<Progress>>,
}

fn informer<K: Resource>(api: &ApiHandle<K>, namespace: &str, resync: Duration) -> Arc<Informer<K>> {
    Informer::with_resync(api.clone(), ListParams::namespaced(namespace), resync)
}

impl InformerSet {
    pub fn new(store: &Store, namespace: &str) -> Self {
        Self::with_resync(store, namespace, DEFAULT_RESYNC)
    }

    pub fn with_resync(store: &Store, namespace: &str, resync: Duration) -> Self {
        Self {
            events: informer(&store.events, namespace, resync),
            vm_sets: informer(&store.vm_sets, namespace, resync),
            dbcs: informer(&store.dbcs, namespace, resync),
            vms: informer(&store.vms, namespace, resync),
            claims: informer(&store.claims, namespace, resync),
            access_codes: informer(&store.access_codes, namespace, resync),
            otacs: informer(&store.otacs, namespace, resync),
            sessions: informer(&store.sessions, namespace, resync),
            tokens: informer(&store.tokens, namespace, resync),
            costs: informer(&store.costs, namespace, resync),
            environments: informer(&store.environments, namespace, resync),
            settings: informer(&store.settings, namespace, resync),
            progress: informer(&store.progress, namespace, resync),
        }
    }

    /// Every informer as a supervisable unit.
    pub fn runnables(&self) -> Vec<Arc<dyn Runnable>> {
        vec![
            self.events.clone(),
            self.vm_sets.clone(),
            self.dbcs.clone(),
            self.vms.clone(),
            self.claims.clone(),
            self.access_codes.clone(),
            self.otacs.clone(),
            self.sessions.clone(),
            self.tokens.clone(),
            self.costs.clone(),
            self.environments.clone(),
            self.settings.clone(),
            self.progress.clone(),
        ]
    }

    fn metas(&self) -> Vec<Arc<dyn MetaInformer>> {
        vec![
            self.events.clone(),
            self.vm_sets.clone(),
            self.dbcs.clone(),
            self.vms.clone(),
            self.claims.clone(),
            self.access_codes.clone(),
            self.otacs.clone(),
            self.sessions.clone(),
            self.tokens.clone(),
            self.costs.clone(),
            self.environments.clone(),
            self.settings.clone(),
            self.progress.clone(),
        ]
    }

    /// Kind-erased informer by lowercase plural (`virtualmachines`).
    pub fn by_plural(&self, plural: &str) -> Option<Arc<dyn MetaInformer>> {
        self.metas().into_iter().find(|m| m.plural() == plural)
    }

    pub fn sync_signals(&self) -> Vec<SyncSignal> {
        vec![
            self.events.sync_signal(),
            self.vm_sets.sync_signal(),
            self.dbcs.sync_signal(),
            self.vms.sync_signal(),
            self.claims.sync_signal(),
            self.access_codes.sync_signal(),
            self.otacs.sync_signal(),
            self.sessions.sync_signal(),
            self.tokens.sync_signal(),
            self.costs.sync_signal(),
            self.environments.sync_signal(),
            self.settings.sync_signal(),
            self.progress.sync_signal(),
        ]
    }

    pub async fn wait_synced(&self, cancel: &CancellationToken) -> bool {
        wait_for_sync(self.sync_signals(), cancel).await
    }

    /// Spawn every informer on the current runtime.
    pub fn spawn(&self, cancel: &CancellationToken) {
        for unit in self.runnables() {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let name = unit.name();
                if let Err(e) = unit.run(cancel).await {
                    tracing::error!(unit = %name, error = %e, "informer exited");
                }
            });
        }
    }

    /// Wait until every cache has observed the store's current version.
    pub async fn settle(&self, store: &Store) {
        let all = ListParams::default();
        macro_rules! settle {
            ($($field:ident),*) => {
                $(
                    if let Ok(list) = store.$field.list(&all).await {
                        self.$field.lister().wait_for_version(list.resource_version).await;
                    }
                )*
            };
        }
        settle!(
            events,
            vm_sets,
            dbcs,
            vms,
            claims,
            access_codes,
            otacs,
            sessions,
            tokens,
            costs,
            environments,
            settings,
            progress
        );
    }
}
