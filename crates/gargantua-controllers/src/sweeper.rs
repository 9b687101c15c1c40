//! Garbage collection of VMs whose owners are gone.
//!
//! * a VM of a missing VMSet is deleted;
//! * a dynamic VM whose claim is gone is deleted;
//! * a static VM whose claim is gone is tainted and released, so its VMSet
//!   replaces it.
use std::sync::Arc;

use async_trait::async_trait;
use gargantua_core::{
    retry,
    runtime::{Action, ReconcileResult, Reconciler},
    store::{OptionalExt, ignore_not_found},
};
use gargantua_model::{Resource, split_key};
use tracing::info;

use crate::context::Context;

pub struct VmSweeper {
    ctx: Arc<Context>,
}

impl VmSweeper {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for VmSweeper {
    fn name(&self) -> &'static str {
        "vmsweeper"
    }

    async fn reconcile(&self, key: &str) -> ReconcileResult {
        let (ns, name) = split_key(key);
        let store = &self.ctx.store;
        let Some(vm) = store.vms.get(ns, name).await.optional()? else {
            return Ok(Action::Done);
        };

        let set = vm.spec.vm_set_id.as_str();
        if !set.is_empty() && store.vm_sets.get(ns, set).await.optional()?.is_none() {
            ignore_not_found(store.vms.delete(ns, name).await)?;
            info!(vm = name, vm_set = set, "vm set gone, vm deleted");
            return Ok(Action::Done);
        }

        let claim = vm.spec.vm_claim_id.as_str();
        let claim_gone = !claim.is_empty() && store.claims.get(ns, claim).await.optional()?.is_none();
        if set.is_empty() {
            if claim.is_empty() || claim_gone {
                ignore_not_found(store.vms.delete(ns, name).await)?;
                info!(vm = name, claim, "dynamic vm without claim deleted");
            }
            return Ok(Action::Done);
        }

        if claim_gone {
            retry::update_status(store.vms.as_ref(), ns, name, |cur| {
                if cur.status.tainted && !cur.status.allocated {
                    return false;
                }
                cur.status.tainted = true;
                cur.status.allocated = false;
                true
            })
            .await
            .optional()?;
            info!(vm = vm.name(), claim, "claim gone, static vm tainted");
        }
        Ok(Action::Done)
    }
}

#[cfg(test)]
mod tests {
    use gargantua_model::{
        ObjectMeta, VirtualMachine, VirtualMachineSet, VirtualMachineSetSpec, VirtualMachineSpec,
        VirtualMachineStatus,
    };

    use super::*;
    use crate::testing::{Api, Harness, NS};

    fn vm(name: &str, set: &str, claim: &str) -> VirtualMachine {
        VirtualMachine {
            metadata: ObjectMeta::named(name).in_namespace(NS),
            spec: VirtualMachineSpec {
                template_id: "tmpl-x".into(),
                vm_set_id: set.into(),
                vm_claim_id: claim.into(),
                ..Default::default()
            },
            status: VirtualMachineStatus {
                allocated: !claim.is_empty(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn orphaned_vms_are_collected() {
        let h = Harness::new().await;
        let api = &h.ctx.store.vms;
        h.ctx
            .store
            .vm_sets
            .create(VirtualMachineSet::new(
                ObjectMeta::named("set-1").in_namespace(NS),
                VirtualMachineSetSpec::default(),
            ))
            .await
            .unwrap();
        api.create(vm("dyn-1", "", "gone")).await.unwrap();
        api.create(vm("static-1", "set-1", "gone")).await.unwrap();
        api.create(vm("static-2", "set-2", "")).await.unwrap();
        api.create(vm("static-3", "set-1", "")).await.unwrap();

        let r = VmSweeper::new(h.ctx.clone());
        for key in ["labs/dyn-1", "labs/static-1", "labs/static-2", "labs/static-3"] {
            assert_eq!(r.reconcile(key).await.unwrap(), Action::Done);
        }

        assert!(api.get(NS, "dyn-1").await.unwrap_err().is_not_found());
        assert!(api.get(NS, "static-2").await.unwrap_err().is_not_found());

        let tainted = api.get(NS, "static-1").await.unwrap();
        assert!(tainted.status.tainted);
        assert!(!tainted.status.allocated);

        let untouched = api.get(NS, "static-3").await.unwrap();
        assert!(!untouched.status.tainted);
    }
}
