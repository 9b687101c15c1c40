//! Keeps each VMSet at its requested number of static VMs.
use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use gargantua_core::{
    retry,
    runtime::{Action, ReconcileResult, Reconciler},
    store::{ListParams, OptionalExt, ignore_not_found},
};
use gargantua_model::{
    LABEL_BOUND, LABEL_DYNAMIC, LABEL_ENVIRONMENT, LABEL_PROVISIONER, LABEL_RESTRICTED_BIND,
    LABEL_RESTRICTED_BIND_VALUE, LABEL_SCHEDULED_EVENT, LABEL_VM_SET, MachineState, ObjectMeta,
    Resource, Selector, VirtualMachine, VirtualMachineSet, VirtualMachineSpec,
    VirtualMachineStatus, VmPhase, VmType, bool_label, split_key, template_label,
};
use tracing::{debug, info};

use crate::{context::Context, naming};

pub struct VmSetReconciler {
    ctx: Arc<Context>,
}

impl VmSetReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    fn machine(&self, set: &VirtualMachineSet, name: String) -> VirtualMachine {
        let spec = &set.spec;
        let mut labels = set
            .labels()
            .iter()
            .filter(|(k, _)| *k == LABEL_SCHEDULED_EVENT)
            .collect::<gargantua_model::Labels>()
            .with(LABEL_VM_SET, set.name())
            .with(LABEL_ENVIRONMENT, spec.environment.as_str())
            .with(template_label(&spec.vm_template), "true")
            .with(LABEL_BOUND, bool_label(false))
            .with(LABEL_DYNAMIC, bool_label(false))
            .with(LABEL_RESTRICTED_BIND, bool_label(spec.restricted_bind));
        if spec.restricted_bind {
            labels.insert(LABEL_RESTRICTED_BIND_VALUE, spec.restricted_bind_value.as_str());
        }
        let env = self
            .ctx
            .informers
            .environments
            .lister()
            .get(&set.metadata.namespace, &spec.environment);
        let provisioner = env.as_ref().and_then(|e| e.provisioner().map(str::to_string));
        if let Some(p) = &provisioner {
            labels.insert(LABEL_PROVISIONER, p.as_str());
        }

        VirtualMachine {
            metadata: ObjectMeta::named(name)
                .in_namespace(set.metadata.namespace.clone())
                .with_labels(labels)
                .owned_by(set.controller_ref()),
            spec: VirtualMachineSpec {
                template_id: spec.vm_template.clone(),
                provision: provisioner.is_none(),
                vm_set_id: set.name().to_string(),
                vm_type: VmType::User,
                ..Default::default()
            },
            status: VirtualMachineStatus {
                phase: VmPhase::ReadyForProvisioning,
                environment_id: spec.environment.clone(),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl Reconciler for VmSetReconciler {
    fn name(&self) -> &'static str {
        "vmset"
    }

    async fn reconcile(&self, key: &str) -> ReconcileResult {
        let (ns, name) = split_key(key);
        let store = &self.ctx.store;
        let by_set = Selector::everything().eq(LABEL_VM_SET, name);

        let Some(set) = store.vm_sets.get(ns, name).await.optional()? else {
            let removed = store
                .vms
                .delete_collection(&ListParams::namespaced(ns).with_selector(by_set))
                .await?;
            if removed > 0 {
                info!(vm_set = name, removed, "vm set gone, removed its vms");
            }
            return Ok(Action::Done);
        };

        let vms = self.ctx.informers.vms.lister().list_in(ns, &by_set);
        let names: BTreeSet<String> = vms.iter().map(|v| v.name().to_string()).collect();

        for vm in vms.iter().filter(|v| v.status.tainted && !v.status.allocated) {
            ignore_not_found(store.vms.delete(ns, vm.name()).await)?;
            debug!(vm_set = name, vm = vm.name(), "removed tainted vm");
        }

        let mut live: Vec<MachineState> = vms
            .iter()
            .filter(|v| !v.status.tainted)
            .map(|v| MachineState {
                vm_name: v.name().to_string(),
                phase: v.status.phase,
                tainted: false,
            })
            .collect();
        let mut free: BTreeSet<String> = vms
            .iter()
            .filter(|v| v.is_free())
            .map(|v| v.name().to_string())
            .collect();
        let want = set.spec.count as usize;

        let mut index = 0usize;
        let mut created = 0usize;
        while live.len() < want {
            let vm_name = naming::static_vm_name(&set.spec.base_name, set.name(), index);
            index += 1;
            if names.contains(&vm_name) {
                continue;
            }
            match store.vms.create(self.machine(&set, vm_name.clone())).await {
                Err(e) if !e.is_already_exists() => return Err(e.into()),
                _ => {}
            }
            live.push(MachineState {
                vm_name: vm_name.clone(),
                phase: VmPhase::ReadyForProvisioning,
                tainted: false,
            });
            free.insert(vm_name);
            created += 1;
        }

        let mut removed = 0usize;
        if live.len() > want {
            let surplus: Vec<String> = free.iter().rev().take(live.len() - want).cloned().collect();
            for vm_name in &surplus {
                ignore_not_found(store.vms.delete(ns, vm_name).await)?;
                free.remove(vm_name);
                removed += 1;
            }
            live.retain(|m| !surplus.contains(&m.vm_name));
        }
        if created + removed > 0 {
            info!(vm_set = name, created, removed, count = want, "vm set scaled");
        }

        live.sort_by(|a, b| a.vm_name.cmp(&b.vm_name));
        let provisioned = u32::try_from(live.len()).unwrap_or(u32::MAX);
        let available = u32::try_from(free.len()).unwrap_or(u32::MAX);
        retry::update_status(store.vm_sets.as_ref(), ns, name, |cur| {
            let before = cur.status.clone();
            cur.status.provisioned = provisioned;
            cur.status.available = available;
            cur.status.machines = live.clone();
            cur.status != before
        })
        .await?;
        Ok(Action::Done)
    }
}

#[cfg(test)]
mod tests {
    use gargantua_model::{Labels, VirtualMachineSetSpec};

    use super::*;
    use crate::testing::{Api, Harness, NS};

    async fn set(h: &Harness, count: u32) {
        let set = VirtualMachineSet::new(
            ObjectMeta::named("set-1")
                .in_namespace(NS)
                .with_labels(Labels::new().with(LABEL_SCHEDULED_EVENT, "se-1")),
            VirtualMachineSetSpec {
                count,
                environment: "env-a".into(),
                vm_template: "tmpl-x".into(),
                base_name: "scheduled".into(),
                ..Default::default()
            },
        );
        h.ctx.store.vm_sets.create(set).await.unwrap();
        h.settle().await;
    }

    async fn vms(h: &Harness) -> Vec<VirtualMachine> {
        h.ctx
            .store
            .vms
            .list(&ListParams::default())
            .await
            .unwrap()
            .items
    }

    #[tokio::test]
    async fn creates_missing_vms_and_reports_status() {
        let h = Harness::new().await;
        h.environment("env-a", &[("tmpl-x", 10)]).await;
        set(&h, 2).await;
        let r = VmSetReconciler::new(h.ctx.clone());

        r.reconcile("labs/set-1").await.unwrap();
        let all = vms(&h).await;
        assert_eq!(all.len(), 2);
        let vm = &all[0];
        assert_eq!(vm.name(), "scheduled-set-1-0");
        assert!(vm.labels().has(LABEL_SCHEDULED_EVENT, "se-1"));
        assert!(vm.labels().has(LABEL_BOUND, "false"));
        assert!(vm.labels().flag(&template_label("tmpl-x")));
        assert_eq!(vm.spec.vm_set_id, "set-1");
        assert!(vm.is_free());

        let stored = h.ctx.store.vm_sets.get(NS, "set-1").await.unwrap();
        assert_eq!(stored.status.provisioned, 2);
        assert_eq!(stored.status.available, 2);
        assert_eq!(stored.status.machines.len(), 2);

        // Nothing changes once the cache caught up.
        h.settle().await;
        let rv = stored.metadata.resource_version;
        r.reconcile("labs/set-1").await.unwrap();
        assert_eq!(vms(&h).await.len(), 2);
        assert_eq!(
            h.ctx.store.vm_sets.get(NS, "set-1").await.unwrap().metadata.resource_version,
            rv
        );
    }

    #[tokio::test]
    async fn tainted_vms_are_replaced_and_surplus_removed() {
        let h = Harness::new().await;
        set(&h, 2).await;
        let r = VmSetReconciler::new(h.ctx.clone());
        r.reconcile("labs/set-1").await.unwrap();
        h.settle().await;

        let mut first = h.ctx.store.vms.get(NS, "scheduled-set-1-0").await.unwrap();
        first.status.tainted = true;
        h.ctx.store.vms.update_status(first).await.unwrap();
        h.settle().await;

        r.reconcile("labs/set-1").await.unwrap();
        let names: Vec<String> = vms(&h).await.iter().map(|v| v.name().to_string()).collect();
        assert_eq!(names, vec!["scheduled-set-1-1", "scheduled-set-1-2"]);

        let mut scaled = h.ctx.store.vm_sets.get(NS, "set-1").await.unwrap();
        scaled.spec.count = 1;
        h.ctx.store.vm_sets.update(scaled).await.unwrap();
        h.settle().await;

        r.reconcile("labs/set-1").await.unwrap();
        let names: Vec<String> = vms(&h).await.iter().map(|v| v.name().to_string()).collect();
        assert_eq!(names, vec!["scheduled-set-1-1"]);
    }

    #[tokio::test]
    async fn deleted_set_takes_its_vms() {
        let h = Harness::new().await;
        set(&h, 2).await;
        let r = VmSetReconciler::new(h.ctx.clone());
        r.reconcile("labs/set-1").await.unwrap();

        h.ctx.store.vm_sets.delete(NS, "set-1").await.unwrap();
        r.reconcile("labs/set-1").await.unwrap();
        assert!(vms(&h).await.is_empty());
    }
}
