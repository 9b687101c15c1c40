//! Live capacity accounting.
//!
//! Counts come from the VM cache, which lags behind the store. VMs created
//! by a placement are held in a reservation ledger until the cache sees
//! them, so two claims placed back to back cannot both take the last unit.
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

use gargantua_core::informer::Lister;
use gargantua_model::{
    LABEL_ENVIRONMENT, LABEL_SCHEDULED_EVENT, Selector, VirtualMachine, object_key,
    template_label,
};
use tracing::debug;

use crate::placement::{Assignment, Plan, PlacementError, PlacementRequest, Usage, plan};

/// Reservations the cache never confirmed are dropped after this long.
pub const RESERVATION_TTL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
struct Reservation {
    template: String,
    environment: String,
    event: String,
    at: Instant,
}

pub struct CapacityAccountant {
    vms: Lister<VirtualMachine>,
    ledger: Mutex<HashMap<String, Reservation>>,
}

impl CapacityAccountant {
    pub fn new(vms: Lister<VirtualMachine>) -> Self {
        Self {
            vms,
            ledger: Mutex::new(HashMap::new()),
        }
    }

    fn ledger(&self) -> MutexGuard<'_, HashMap<String, Reservation>> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Non-terminating VMs of `template` in `environment`, plus pending reservations.
    pub fn count(&self, template: &str, environment: &str) -> u32 {
        let ledger = self.ledger();
        Snapshot { accountant: self, ledger: &ledger }.count(template, environment)
    }

    pub fn count_for_event(&self, template: &str, environment: &str, event: &str) -> u32 {
        let ledger = self.ledger();
        Snapshot { accountant: self, ledger: &ledger }.count_for_event(template, environment, event)
    }

    /// Plan the request and reserve every assigned VM in one step.
    ///
    /// `vm_key` maps an assignment to the `namespace/name` of the VM the
    /// caller is about to create.
    pub fn place(
        &self,
        req: &PlacementRequest<'_>,
        vm_key: impl Fn(&Assignment) -> String,
    ) -> Result<Plan, PlacementError> {
        let mut ledger = self.ledger();
        self.prune(&mut ledger);

        let plan = plan(req, &Snapshot { accountant: self, ledger: &ledger })?;
        let now = Instant::now();
        for a in &plan.assignments {
            ledger.insert(
                vm_key(a),
                Reservation {
                    template: a.template.clone(),
                    environment: a.environment.clone(),
                    event: req.event.to_string(),
                    at: now,
                },
            );
        }
        Ok(plan)
    }

    /// Drop reservations for VMs that will not be created.
    pub fn release<'a>(&self, keys: impl IntoIterator<Item = &'a str>) {
        let mut ledger = self.ledger();
        for key in keys {
            ledger.remove(key);
        }
    }

    /// Number of reservations not yet confirmed by the cache.
    pub fn pending(&self) -> usize {
        let mut ledger = self.ledger();
        self.prune(&mut ledger);
        ledger.len()
    }

    fn prune(&self, ledger: &mut HashMap<String, Reservation>) {
        ledger.retain(|key, r| {
            let (ns, name) = gargantua_model::split_key(key);
            let seen = self.vms.get(ns, name).is_some();
            let stale = r.at.elapsed() > RESERVATION_TTL;
            if stale {
                debug!(vm = %key, "dropping unconfirmed reservation");
            }
            !seen && !stale
        });
    }
}

struct Snapshot<'a> {
    accountant: &'a CapacityAccountant,
    ledger: &'a HashMap<String, Reservation>,
}

impl Snapshot<'_> {
    fn live(&self, selector: &Selector) -> u32 {
        let n = self
            .accountant
            .vms
            .list(selector)
            .iter()
            .filter(|vm| !vm.is_terminating())
            .count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    fn reserved(&self, keep: impl Fn(&Reservation) -> bool) -> u32 {
        let n = self
            .ledger
            .iter()
            .filter(|(key, r)| {
                let (ns, name) = gargantua_model::split_key(key);
                keep(r) && self.accountant.vms.get(ns, name).is_none()
            })
            .count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }
}

impl Usage for Snapshot<'_> {
    fn count(&self, template: &str, environment: &str) -> u32 {
        let sel = Selector::everything()
            .eq(LABEL_ENVIRONMENT, environment)
            .eq(template_label(template), "true");
        self.live(&sel)
            + self.reserved(|r| r.template == template && r.environment == environment)
    }

    fn count_for_event(&self, template: &str, environment: &str, event: &str) -> u32 {
        let sel = Selector::everything()
            .eq(LABEL_SCHEDULED_EVENT, event)
            .eq(LABEL_ENVIRONMENT, environment)
            .eq(template_label(template), "true");
        self.live(&sel)
            + self.reserved(|r| {
                r.template == template && r.environment == environment && r.event == event
            })
    }
}

/// `namespace/name` of a VM, as used for reservation keys.
pub fn reservation_key(namespace: &str, name: &str) -> String {
    object_key(namespace, name)
}
