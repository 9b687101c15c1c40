//! Wiring of every controller to the shared informers.
use std::sync::Arc;

use gargantua_core::{
    informer::{Informer, Notification},
    runtime::{Controller, ControllerSettings, QueueHandle, Reconciler, Runnable},
};
use gargantua_model::{
    LABEL_SCHEDULED_EVENT, LABEL_VM_SET, Resource, Selector, VirtualMachine, VirtualMachineClaim,
    VirtualMachineSet, object_key,
};

use crate::{
    claim::VmClaimReconciler,
    context::Context,
    cost::{CostConfigError, CostReconciler, CostTarget},
    event::ScheduledEventReconciler,
    sweeper::VmSweeper,
    token::PasswordResetTokenReconciler,
    vmset::VmSetReconciler,
};

/// Enqueue the keys `map` derives from every change to `informer`.
fn route<K, F>(informer: &Informer<K>, queue: QueueHandle, map: F)
where
    K: Resource,
    F: Fn(&Notification<'_, K>) -> Vec<String> + Send + Sync + 'static,
{
    informer.add_handler(Arc::new(move |n: Notification<'_, K>| {
        for key in map(&n) {
            queue.add(key);
        }
    }));
}

fn own_key<K: Resource>(n: &Notification<'_, K>) -> Vec<String> {
    vec![n.object().key()]
}

/// Key of the object named by `label`, in the notifying object's namespace.
fn label_key<K: Resource>(
    label: &'static str,
) -> impl Fn(&Notification<'_, K>) -> Vec<String> + Send + Sync + 'static {
    move |n| {
        let o = n.object();
        o.labels()
            .get(label)
            .map(|v| object_key(&o.meta().namespace, v))
            .into_iter()
            .collect()
    }
}

fn controller<R: Reconciler>(
    ctx: &Context,
    settings: ControllerSettings,
    reconciler: R,
) -> Arc<Controller<R>> {
    Arc::new(
        Controller::new(Arc::new(reconciler), settings, ctx.metrics.clone())
            .with_sync(ctx.informers.sync_signals()),
    )
}

/// Every controller of the control plane, wired to its informers.
pub struct Controllers {
    pub events: Arc<Controller<ScheduledEventReconciler>>,
    pub claims: Arc<Controller<VmClaimReconciler>>,
    pub vm_sets: Arc<Controller<VmSetReconciler>>,
    pub sweeper: Arc<Controller<VmSweeper>>,
    pub tokens: Arc<Controller<PasswordResetTokenReconciler>>,
    pub costs: Arc<Controller<CostReconciler>>,
    ordinal: u32,
}

impl Controllers {
    pub fn new(ctx: Arc<Context>, cost_targets: &[CostTarget]) -> Result<Self, CostConfigError> {
        let unsharded = ctx.config.unsharded();
        let inf = &ctx.informers;

        let events = controller(&ctx, unsharded.clone(), ScheduledEventReconciler::new(ctx.clone()));
        let claims = controller(&ctx, unsharded.clone(), VmClaimReconciler::new(ctx.clone()));
        let vm_sets = controller(&ctx, unsharded.clone(), VmSetReconciler::new(ctx.clone()));
        let sweeper = controller(&ctx, unsharded.clone(), VmSweeper::new(ctx.clone()));
        let tokens = controller(
            &ctx,
            ctx.config.sharded(),
            PasswordResetTokenReconciler::new(ctx.clone()),
        );
        let costs = controller(
            &ctx,
            unsharded,
            CostReconciler::new(ctx.clone(), inf, cost_targets)?,
        );

        route(&inf.events, events.handle(), own_key);
        route(&inf.vm_sets, events.handle(), label_key(LABEL_SCHEDULED_EVENT));

        route(&inf.claims, claims.handle(), own_key);
        route(&inf.vms, claims.handle(), |n: &Notification<'_, VirtualMachine>| {
            let vm = n.object();
            if vm.spec.vm_claim_id.is_empty() {
                return Vec::new();
            }
            vec![object_key(&vm.metadata.namespace, &vm.spec.vm_claim_id)]
        });

        route(&inf.vm_sets, vm_sets.handle(), own_key);
        route(&inf.vms, vm_sets.handle(), label_key(LABEL_VM_SET));

        // A deleted claim or set may leave VMs behind; revisit each of them.
        route(&inf.vms, sweeper.handle(), own_key);
        route(
            &inf.claims,
            sweeper.handle(),
            |n: &Notification<'_, VirtualMachineClaim>| match n {
                Notification::Deleted(claim) => claim
                    .spec
                    .virtual_machines
                    .vm_ids()
                    .map(|vm| object_key(&claim.metadata.namespace, vm))
                    .collect(),
                _ => Vec::new(),
            },
        );
        let vms = inf.vms.lister();
        route(
            &inf.vm_sets,
            sweeper.handle(),
            move |n: &Notification<'_, VirtualMachineSet>| match n {
                Notification::Deleted(set) => vms
                    .list_in(
                        &set.metadata.namespace,
                        &Selector::everything().eq(LABEL_VM_SET, set.name()),
                    )
                    .iter()
                    .map(Resource::key)
                    .collect(),
                _ => Vec::new(),
            },
        );

        route(&inf.tokens, tokens.handle(), own_key);
        costs.reconciler().watch(costs.handle());

        Ok(Self {
            events,
            claims,
            vm_sets,
            sweeper,
            tokens,
            costs,
            ordinal: ctx.config.shard.ordinal(),
        })
    }

    /// Units this replica runs.
    ///
    /// Sharded controllers run on every replica, the rest only on ordinal 0.
    pub fn runnables(&self) -> Vec<Arc<dyn Runnable>> {
        let mut units: Vec<Arc<dyn Runnable>> = vec![self.tokens.clone()];
        if self.ordinal == 0 {
            units.push(self.events.clone());
            units.push(self.claims.clone());
            units.push(self.vm_sets.clone());
            units.push(self.sweeper.clone());
            units.push(self.costs.clone());
        }
        units
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gargantua_core::shard::Shard;
    use gargantua_model::VmPhase;

    use super::*;
    use crate::{
        context::ControllerConfig,
        testing::{Api, Harness, NS},
    };

    #[tokio::test]
    async fn only_sharded_controllers_run_off_ordinal_zero() {
        let config = ControllerConfig {
            namespace: NS.into(),
            shard: Shard::new(1, 3).unwrap(),
            ..Default::default()
        };
        let h = Harness::with_config(config).await;
        let controllers = Controllers::new(h.ctx.clone(), &[]).unwrap();

        let names: Vec<String> = controllers.runnables().iter().map(|r| r.name()).collect();
        assert_eq!(names.len(), 1);

        let leader = Harness::new().await;
        let all = Controllers::new(leader.ctx.clone(), &[]).unwrap();
        assert_eq!(all.runnables().len(), 6);
    }

    #[tokio::test]
    async fn vm_changes_reach_claim_set_and_sweeper_queues() {
        let h = Harness::new().await;
        let controllers = Controllers::new(h.ctx.clone(), &[]).unwrap();

        h.free_vm("vm-1", "env-a", "ubuntu", VmPhase::Running).await;
        let mut vm = h.ctx.store.vms.get(NS, "vm-1").await.unwrap();
        vm.metadata.labels.insert(LABEL_VM_SET, "set-1");
        vm.spec.vm_claim_id = "claim-1".into();
        h.ctx.store.vms.update(vm).await.unwrap();
        h.settle().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!controllers.claims.handle().is_empty());
        assert!(!controllers.vm_sets.handle().is_empty());
        assert!(!controllers.sweeper.handle().is_empty());
        assert!(controllers.events.handle().is_empty());
    }
}
