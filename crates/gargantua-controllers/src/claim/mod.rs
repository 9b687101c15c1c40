//! VM claim binding.
//!
//! A claim moves `unbound -> bound -> ready`. Binding is dynamic (new VMs
//! placed through the capacity accountant) or static (free VMs taken from
//! the event's VMSets). A claim that cannot be satisfied is tainted, which
//! expires its session and deletes the claim on the next pass.
use std::sync::Arc;

use async_trait::async_trait;
use gargantua_core::{
    retry,
    runtime::{Action, ReconcileError, ReconcileResult, Reconciler},
    store::{OptionalExt, ignore_not_found},
};
use gargantua_model::{
    BindMode, LABEL_ACCESS_CODE, LABEL_SESSION, Resource, ScheduledEvent, VirtualMachineClaim,
    format_unix_date, split_key,
};
use tracing::{debug, info, warn};

use crate::context::Context;

mod dynamic;
mod static_bind;

pub struct VmClaimReconciler {
    ctx: Arc<Context>,
}

/// Bind domain of a claim: its own value, or the one inherited from its event.
fn bind_value(claim: &VirtualMachineClaim, event: &ScheduledEvent) -> String {
    if claim.spec.restricted_bind {
        claim.spec.restricted_bind_value.clone()
    } else {
        event.bind_value().to_string()
    }
}

impl VmClaimReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Mark the claim unsatisfiable and expire its session.
    async fn taint(&self, claim: &VirtualMachineClaim, reason: &str) -> Result<(), ReconcileError> {
        let ns = claim.metadata.namespace.as_str();
        let store = &self.ctx.store;

        if let Some(session) = claim.labels().get(LABEL_SESSION) {
            let now = format_unix_date(self.ctx.clock.now());
            retry::update_status(store.sessions.as_ref(), ns, session, |cur| {
                if cur.status.finished && !cur.status.active {
                    return false;
                }
                cur.status.active = false;
                cur.status.finished = true;
                cur.status.expiration_time = now.clone();
                true
            })
            .await
            .optional()?;
        }
        retry::update_status(store.claims.as_ref(), ns, claim.name(), |cur| {
            if cur.status.tainted {
                return false;
            }
            cur.status.tainted = true;
            true
        })
        .await?;
        warn!(claim = claim.name(), reason, "claim tainted");
        Ok(())
    }

    /// Record the bound slots.
    ///
    /// Only empty slots are filled. When the status write fails, the slots
    /// filled here are emptied again.
    async fn mark_bound<'a>(
        &self,
        claim: &VirtualMachineClaim,
        assigned: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<(), ReconcileError> {
        let ns = claim.metadata.namespace.as_str();
        let assigned: Vec<(&str, &str)> = assigned.into_iter().collect();
        let mut written: Vec<(String, String)> = Vec::new();
        retry::update_spec(self.ctx.store.claims.as_ref(), ns, claim.name(), |cur| {
            written.clear();
            for (slot, vm) in &assigned {
                if cur.spec.virtual_machines.fill(slot, vm) {
                    written.push((slot.to_string(), vm.to_string()));
                }
            }
            !written.is_empty()
        })
        .await?;

        let bound = retry::update_status(self.ctx.store.claims.as_ref(), ns, claim.name(), |cur| {
            let before = cur.status.clone();
            cur.status.bound = true;
            cur.status.ready = false;
            cur.status != before
        })
        .await;
        if let Err(e) = bound {
            if let Err(undo) = self.release_slots(ns, claim.name(), &written).await {
                warn!(claim = claim.name(), error = %undo, "could not release claim slots");
            }
            return Err(e.into());
        }
        info!(claim = claim.name(), vms = written.len(), "claim bound");
        Ok(())
    }

    /// Empty the slots that still hold the given VMs.
    async fn release_slots(
        &self,
        ns: &str,
        claim: &str,
        slots: &[(String, String)],
    ) -> Result<(), ReconcileError> {
        if slots.is_empty() {
            return Ok(());
        }
        retry::update_spec(self.ctx.store.claims.as_ref(), ns, claim, |cur| {
            let mut changed = false;
            for (slot, vm) in slots {
                changed |= cur.spec.virtual_machines.release(slot, vm);
            }
            changed
        })
        .await
        .optional()?;
        Ok(())
    }

    /// A bound claim turns ready once every VM runs.
    async fn check_ready(&self, claim: &VirtualMachineClaim) -> ReconcileResult {
        let ns = claim.metadata.namespace.as_str();
        let vms = self.ctx.informers.vms.lister();
        let slots = &claim.spec.virtual_machines;
        let waiting = slots
            .iter()
            .filter(|s| !s.is_assigned() || !vms.get(ns, &s.vm_id).is_some_and(|vm| vm.is_running()))
            .count();
        if waiting > 0 {
            debug!(claim = claim.name(), waiting, "vms not running yet");
            return Ok(Action::RequeueAfter(self.ctx.config.ready_poll));
        }

        retry::update_status(self.ctx.store.claims.as_ref(), ns, claim.name(), |cur| {
            if cur.status.ready {
                return false;
            }
            cur.status.ready = true;
            true
        })
        .await?;
        info!(claim = claim.name(), "claim ready");
        Ok(Action::Done)
    }

    async fn bind(&self, claim: &VirtualMachineClaim) -> ReconcileResult {
        let ns = claim.metadata.namespace.as_str();
        let code = claim.labels().get(LABEL_ACCESS_CODE).ok_or_else(|| {
            ReconcileError::Validation(format!("claim {} has no access code label", claim.name()))
        })?;
        let resolved = self.ctx.resolver.resolve(ns, code)?;
        match claim.status.bind_mode {
            BindMode::Dynamic => self.bind_dynamic(claim, &resolved.event).await,
            BindMode::Static => self.bind_static(claim, &resolved.event).await,
        }
    }
}

#[async_trait]
impl Reconciler for VmClaimReconciler {
    fn name(&self) -> &'static str {
        "vmclaim"
    }

    async fn reconcile(&self, key: &str) -> ReconcileResult {
        let (ns, name) = split_key(key);
        let Some(claim) = self.ctx.store.claims.get(ns, name).await.optional()? else {
            return Ok(Action::Done);
        };

        if claim.status.tainted {
            ignore_not_found(self.ctx.store.claims.delete(ns, name).await)?;
            info!(claim = name, "tainted claim deleted");
            return Ok(Action::Done);
        }
        match (claim.status.bound, claim.status.ready) {
            (true, true) => Ok(Action::Done),
            (true, false) => self.check_ready(&claim).await,
            (false, _) => self.bind(&claim).await,
        }
    }
}

#[cfg(test)]
mod tests;
