use gargantua_core::{
    metrics::PlacementOutcome,
    runtime::{Action, ReconcileError, ReconcileResult},
    store::ignore_not_found,
};
use gargantua_model::{
    ClaimSlots, Environment, LABEL_BOUND, LABEL_DYNAMIC, LABEL_ENVIRONMENT, LABEL_PROVISIONER,
    LABEL_READY, LABEL_RESTRICTED_BIND, LABEL_RESTRICTED_BIND_VALUE, LABEL_SCHEDULED_EVENT,
    LABEL_SESSION, LABEL_USER, Labels, ObjectMeta, Resource, ScheduledEvent, Selector,
    VirtualMachine, VirtualMachineClaim, VirtualMachineSpec, VirtualMachineStatus, VmPhase, VmType,
    bool_label, template_label,
};
use tracing::warn;

use super::{VmClaimReconciler, bind_value};
use crate::{
    capacity::reservation_key,
    naming,
    placement::{Assignment, PlacementRequest},
};

impl VmClaimReconciler {
    fn dynamic_vm(
        &self,
        claim: &VirtualMachineClaim,
        event: &ScheduledEvent,
        a: &Assignment,
        env: Option<&Environment>,
        bind_value: &str,
    ) -> VirtualMachine {
        let restricted = !bind_value.is_empty();
        let mut labels = Labels::new()
            .with(LABEL_ENVIRONMENT, a.environment.as_str())
            .with(template_label(&a.template), "true")
            .with(LABEL_SCHEDULED_EVENT, event.name())
            .with(LABEL_DYNAMIC, bool_label(true))
            .with(LABEL_BOUND, bool_label(true))
            .with(LABEL_READY, bool_label(false))
            .with(LABEL_RESTRICTED_BIND, bool_label(restricted))
            .with(LABEL_USER, claim.spec.user_id.as_str());
        if restricted {
            labels.insert(LABEL_RESTRICTED_BIND_VALUE, bind_value);
        }
        if let Some(session) = claim.labels().get(LABEL_SESSION) {
            labels.insert(LABEL_SESSION, session);
        }
        let provisioner = env.and_then(Environment::provisioner);
        if let Some(p) = provisioner {
            labels.insert(LABEL_PROVISIONER, p);
        }

        VirtualMachine {
            metadata: ObjectMeta::named(naming::dynamic_vm_name(
                &self.ctx.config.dynamic_prefix,
                claim.name(),
                &a.slot,
            ))
            .in_namespace(claim.metadata.namespace.clone())
            .with_labels(labels)
            .owned_by(claim.controller_ref()),
            spec: VirtualMachineSpec {
                template_id: a.template.clone(),
                vm_claim_id: claim.name().to_string(),
                user_id: claim.spec.user_id.clone(),
                provision: provisioner.is_none(),
                vm_type: VmType::User,
                ..Default::default()
            },
            status: VirtualMachineStatus {
                phase: VmPhase::ReadyForProvisioning,
                allocated: true,
                environment_id: a.environment.clone(),
                ..Default::default()
            },
        }
    }

    /// Delete VMs created by a failed pass and drop their reservations.
    async fn roll_back_created(&self, ns: &str, names: &[String]) -> Result<(), ReconcileError> {
        let keys: Vec<String> = names.iter().map(|n| reservation_key(ns, n)).collect();
        self.ctx.capacity.release(keys.iter().map(String::as_str));
        for name in names {
            ignore_not_found(self.ctx.store.vms.delete(ns, name).await)?;
        }
        Ok(())
    }

    pub(super) async fn bind_dynamic(
        &self,
        claim: &VirtualMachineClaim,
        event: &ScheduledEvent,
    ) -> ReconcileResult {
        let ns = claim.metadata.namespace.as_str();
        let open: ClaimSlots = claim
            .spec
            .virtual_machines
            .iter()
            .filter(|s| !s.is_assigned())
            .map(|s| (s.name.as_str(), s.template.as_str()))
            .collect();
        if open.is_empty() && !claim.spec.virtual_machines.is_empty() {
            self.mark_bound(claim, std::iter::empty()).await?;
            return Ok(Action::Done);
        }

        let bind_value = bind_value(claim, event);
        let dbcs = self
            .ctx
            .informers
            .dbcs
            .lister()
            .list_in(ns, &Selector::everything().eq(LABEL_SCHEDULED_EVENT, event.name()));
        let env_lister = self.ctx.informers.environments.lister();
        let mut environments: Vec<Environment> = Vec::new();
        for dbc in &dbcs {
            if environments.iter().all(|e| e.name() != dbc.spec.environment) {
                environments.extend(env_lister.get(ns, &dbc.spec.environment));
            }
        }

        let req = PlacementRequest {
            event: event.name(),
            bind_value: &bind_value,
            slots: &open,
            dbcs: &dbcs,
            environments: &environments,
        };
        let prefix = &self.ctx.config.dynamic_prefix;
        let vm_name = |a: &Assignment| naming::dynamic_vm_name(prefix, claim.name(), &a.slot);

        let plan = match self
            .ctx
            .capacity
            .place(&req, |a| reservation_key(ns, &vm_name(a)))
        {
            Ok(plan) => plan,
            Err(e) => {
                self.ctx.metrics.record_placement(PlacementOutcome::Failed);
                self.taint(claim, &e.to_string()).await?;
                return Err(ReconcileError::Capacity(format!("claim {}: {e}", claim.name())));
            }
        };
        self.ctx.metrics.record_placement(if plan.split {
            PlacementOutcome::Split
        } else {
            PlacementOutcome::Single
        });

        let mut created: Vec<String> = Vec::with_capacity(plan.assignments.len());
        for a in &plan.assignments {
            let env = environments.iter().find(|e| e.name() == a.environment);
            let vm = self.dynamic_vm(claim, event, a, env, &bind_value);
            let name = vm.name().to_string();
            match self.ctx.store.vms.create(vm).await {
                Ok(_) => created.push(name),
                Err(e) if e.is_already_exists() => {
                    // Left over from an earlier pass of this claim.
                    let ours = self
                        .ctx
                        .store
                        .vms
                        .get(ns, &name)
                        .await
                        .is_ok_and(|vm| vm.spec.vm_claim_id == claim.name());
                    if !ours {
                        self.roll_back_created(ns, &created).await?;
                        return Err(e.into());
                    }
                    created.push(name);
                }
                Err(e) => {
                    warn!(claim = claim.name(), vm = %name, error = %e, "vm create failed, rolling back");
                    let pending: Vec<String> = plan.assignments.iter().map(&vm_name).collect();
                    self.roll_back_created(ns, &pending).await?;
                    return Err(e.into());
                }
            }
        }

        let assigned: Vec<(&str, String)> = plan
            .assignments
            .iter()
            .map(|a| (a.slot.as_str(), vm_name(a)))
            .collect();
        if let Err(e) = self
            .mark_bound(claim, assigned.iter().map(|(s, v)| (*s, v.as_str())))
            .await
        {
            self.roll_back_created(ns, &created).await?;
            return Err(e);
        }
        Ok(Action::Done)
    }
}
