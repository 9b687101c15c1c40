use gargantua_core::{
    retry,
    runtime::{Action, ReconcileError, ReconcileResult},
    store::OptionalExt,
};
use gargantua_model::{
    BindMode, FALSE, LABEL_BOUND, LABEL_ENVIRONMENT, LABEL_RESTRICTED_BIND,
    LABEL_RESTRICTED_BIND_VALUE, LABEL_USER, Resource, ScheduledEvent, Selector, TRUE,
    VirtualMachine, VirtualMachineClaim, bool_label, template_label,
};
use tracing::{info, warn};

use super::{VmClaimReconciler, bind_value};

impl VmClaimReconciler {
    /// Take the first free VM of `template` for `claim`.
    ///
    /// Running VMs are preferred; ties keep list order. Losing a race for a
    /// VM moves on to the next candidate.
    async fn assign_next_free(
        &self,
        claim: &VirtualMachineClaim,
        template: &str,
        environments: &[&str],
        bind_value: &str,
        exclude: &[String],
    ) -> Result<Option<String>, ReconcileError> {
        let ns = claim.metadata.namespace.as_str();
        let restricted = !bind_value.is_empty();
        let mut selector = Selector::everything()
            .eq(LABEL_BOUND, FALSE)
            .eq(template_label(template), TRUE)
            .eq(LABEL_RESTRICTED_BIND, bool_label(restricted));
        if restricted {
            selector = selector.eq(LABEL_RESTRICTED_BIND_VALUE, bind_value);
        }

        let mut candidates: Vec<VirtualMachine> = self
            .ctx
            .informers
            .vms
            .lister()
            .list_in(ns, &selector)
            .into_iter()
            .filter(|vm| {
                vm.labels()
                    .get(LABEL_ENVIRONMENT)
                    .is_some_and(|e| environments.contains(&e))
            })
            .filter(|vm| vm.is_free() && !exclude.iter().any(|t| t == vm.name()))
            .collect();
        candidates.sort_by_key(|vm| !vm.is_running());

        let user = claim.spec.user_id.as_str();
        for vm in candidates {
            let res = retry::update_spec(self.ctx.store.vms.as_ref(), ns, vm.name(), |cur| {
                if !cur.is_free() || cur.labels().flag(LABEL_BOUND) {
                    return false;
                }
                cur.metadata.labels.insert(LABEL_BOUND, TRUE);
                cur.metadata.labels.insert(LABEL_USER, user);
                cur.spec.vm_claim_id = claim.name().to_string();
                cur.spec.user_id = user.to_string();
                true
            })
            .await
            .optional()?;
            match res {
                Some(cur) if cur.spec.vm_claim_id == claim.name() => {}
                _ => continue,
            }
            retry::update_status(self.ctx.store.vms.as_ref(), ns, vm.name(), |cur| {
                if cur.status.allocated {
                    return false;
                }
                cur.status.allocated = true;
                true
            })
            .await?;
            return Ok(Some(vm.name().to_string()));
        }
        Ok(None)
    }

    /// Return VMs taken by a failed pass to the pool.
    async fn unassign(&self, ns: &str, claim: &str, vms: &[String]) -> Result<(), ReconcileError> {
        for name in vms {
            let res = retry::update_spec(self.ctx.store.vms.as_ref(), ns, name, |cur| {
                if cur.spec.vm_claim_id != claim {
                    return false;
                }
                cur.metadata.labels.insert(LABEL_BOUND, FALSE);
                cur.metadata.labels.remove(LABEL_USER);
                cur.spec.vm_claim_id.clear();
                cur.spec.user_id.clear();
                true
            })
            .await
            .optional()?;
            if res.is_none() {
                continue;
            }
            retry::update_status(self.ctx.store.vms.as_ref(), ns, name, |cur| {
                if !cur.status.allocated {
                    return false;
                }
                cur.status.allocated = false;
                true
            })
            .await
            .optional()?;
        }
        Ok(())
    }

    pub(super) async fn bind_static(
        &self,
        claim: &VirtualMachineClaim,
        event: &ScheduledEvent,
    ) -> ReconcileResult {
        let ns = claim.metadata.namespace.as_str();
        let cfg = &self.ctx.config;

        if claim.status.static_bind_attempts >= cfg.static_bind_threshold {
            if !claim.spec.dynamic_capable {
                let reason = format!(
                    "no free VMs after {} static bind attempts",
                    claim.status.static_bind_attempts
                );
                self.taint(claim, &reason).await?;
                return Err(ReconcileError::Capacity(format!("claim {}: {reason}", claim.name())));
            }
            let updated = retry::update_status(self.ctx.store.claims.as_ref(), ns, claim.name(), |cur| {
                if cur.status.bind_mode == BindMode::Dynamic {
                    return false;
                }
                cur.status.bind_mode = BindMode::Dynamic;
                true
            })
            .await?;
            info!(
                claim = claim.name(),
                attempts = claim.status.static_bind_attempts,
                "static bind exhausted, falling back to dynamic"
            );
            return self.bind_dynamic(&updated, event).await;
        }

        let bind_value = bind_value(claim, event);
        let environments: Vec<&str> = event.environments().collect();
        // Slots that already hold a VM keep it; their VMs are never offered
        // to the remaining slots.
        let mut exclude: Vec<String> = claim
            .spec
            .virtual_machines
            .vm_ids()
            .map(str::to_string)
            .collect();
        let mut taken: Vec<String> = Vec::new();
        let mut assigned: Vec<(&str, String)> = Vec::new();
        for slot in claim.spec.virtual_machines.iter().filter(|s| !s.is_assigned()) {
            let found = self
                .assign_next_free(claim, &slot.template, &environments, &bind_value, &exclude)
                .await;
            let vm = match found {
                Ok(Some(vm)) => vm,
                Ok(None) => {
                    self.unassign(ns, claim.name(), &taken).await?;
                    let after = retry::update_status(self.ctx.store.claims.as_ref(), ns, claim.name(), |cur| {
                        cur.status.static_bind_attempts += 1;
                        true
                    })
                    .await?;
                    warn!(
                        claim = claim.name(),
                        slot = %slot.name,
                        template = %slot.template,
                        attempts = after.status.static_bind_attempts,
                        "no free VM, static bind rolled back"
                    );
                    return Ok(Action::RequeueAfter(cfg.static_bind_retry));
                }
                Err(e) => {
                    self.unassign(ns, claim.name(), &taken).await?;
                    return Err(e);
                }
            };
            exclude.push(vm.clone());
            taken.push(vm.clone());
            assigned.push((slot.name.as_str(), vm));
        }

        if let Err(e) = self
            .mark_bound(claim, assigned.iter().map(|(s, v)| (*s, v.as_str())))
            .await
        {
            self.unassign(ns, claim.name(), &taken).await?;
            return Err(e);
        }
        Ok(Action::Done)
    }
}
