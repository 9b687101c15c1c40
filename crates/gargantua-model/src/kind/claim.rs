use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How a claim obtains its VMs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BindMode {
    /// VMs are created on demand by the placement planner.
    #[default]
    Dynamic,
    /// Pre-provisioned VMs from a VMSet are bound.
    Static,
}

/// One requested VM of a claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSlot {
    pub name: String,
    pub template: String,
    /// Bound VM; empty while unassigned.
    #[serde(default)]
    pub vm_id: String,
}

impl ClaimSlot {
    pub fn is_assigned(&self) -> bool {
        !self.vm_id.is_empty()
    }
}

/// Requested VMs of a claim, in insertion order.
///
/// Placement walks slots in this order, so it is part of the contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSlots(pub Vec<ClaimSlot>);

impl ClaimSlots {
    /// Append a slot, replacing the template of an existing slot with the same name.
    pub fn push(&mut self, name: impl Into<String>, template: impl Into<String>) -> &mut Self {
        let name = name.into();
        let template = template.into();
        match self.0.iter_mut().find(|s| s.name == name) {
            Some(slot) => slot.template = template,
            None => self.0.push(ClaimSlot {
                name,
                template,
                vm_id: String::new(),
            }),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ClaimSlot> {
        self.0.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClaimSlot> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Set the VM of slot `name`. Returns `false` for an unknown slot.
    pub fn assign(&mut self, name: &str, vm_id: impl Into<String>) -> bool {
        match self.0.iter_mut().find(|s| s.name == name) {
            Some(slot) => {
                slot.vm_id = vm_id.into();
                true
            }
            None => false,
        }
    }

    /// Bind `vm_id` to slot `name` only while the slot is empty.
    pub fn fill(&mut self, name: &str, vm_id: &str) -> bool {
        match self.0.iter_mut().find(|s| s.name == name && !s.is_assigned()) {
            Some(slot) => {
                slot.vm_id = vm_id.to_string();
                true
            }
            None => false,
        }
    }

    /// Empty slot `name` if it still holds `vm_id`.
    pub fn release(&mut self, name: &str, vm_id: &str) -> bool {
        match self.0.iter_mut().find(|s| s.name == name && s.vm_id == vm_id) {
            Some(slot) => {
                slot.vm_id.clear();
                true
            }
            None => false,
        }
    }

    pub fn clear_assignments(&mut self) {
        for slot in &mut self.0 {
            slot.vm_id.clear();
        }
    }

    pub fn all_assigned(&self) -> bool {
        self.0.iter().all(ClaimSlot::is_assigned)
    }

    /// Bound VM names in slot order.
    pub fn vm_ids(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|s| s.is_assigned())
            .map(|s| s.vm_id.as_str())
    }

    /// Number of requested VMs per template.
    pub fn required(&self) -> BTreeMap<String, u32> {
        let mut out = BTreeMap::new();
        for slot in &self.0 {
            *out.entry(slot.template.clone()).or_insert(0) += 1;
        }
        out
    }
}

impl<N, T> FromIterator<(N, T)> for ClaimSlots
where
    N: Into<String>,
    T: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, T)>>(iter: I) -> Self {
        let mut slots = ClaimSlots::default();
        for (name, template) in iter {
            slots.push(name, template);
        }
        slots
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineClaimSpec {
    pub user_id: String,
    #[serde(default)]
    pub restricted_bind: bool,
    #[serde(default)]
    pub restricted_bind_value: String,
    #[serde(default)]
    pub virtual_machines: ClaimSlots,
    /// Static claims may fall back to dynamic placement.
    #[serde(default)]
    pub dynamic_capable: bool,
    #[serde(default)]
    pub base_name: String,
}

/// Observed state of a claim.
///
/// `bound` is terminal until taint; `ready` implies `bound`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineClaimStatus {
    #[serde(default)]
    pub bind_mode: BindMode,
    #[serde(default)]
    pub static_bind_attempts: u32,
    #[serde(default)]
    pub bound: bool,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub tainted: bool,
}

resource!(
    /// Reservation for one or more VMs within a session.
    VirtualMachineClaim,
    "VirtualMachineClaim",
    "virtualmachineclaims",
    VirtualMachineClaimSpec,
    VirtualMachineClaimStatus
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_keep_insertion_order() {
        let slots: ClaimSlots = [("web", "tmpl-y"), ("db", "tmpl-x"), ("app", "tmpl-y")]
            .into_iter()
            .collect();
        let names: Vec<_> = slots.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["web", "db", "app"]);

        let required = slots.required();
        assert_eq!(required.get("tmpl-y"), Some(&2));
        assert_eq!(required.get("tmpl-x"), Some(&1));
    }

    #[test]
    fn assign_and_clear() {
        let mut slots: ClaimSlots = [("a", "t"), ("b", "t")].into_iter().collect();
        assert!(slots.assign("a", "vm-1"));
        assert!(!slots.assign("zzz", "vm-2"));
        assert!(!slots.all_assigned());
        assert_eq!(slots.vm_ids().collect::<Vec<_>>(), vec!["vm-1"]);

        assert!(slots.assign("b", "vm-2"));
        assert!(slots.all_assigned());

        slots.clear_assignments();
        assert_eq!(slots.vm_ids().count(), 0);
    }

    #[test]
    fn fill_leaves_taken_slots_and_release_checks_owner() {
        let mut slots: ClaimSlots = [("a", "t"), ("b", "t")].into_iter().collect();
        slots.assign("a", "vm-pre");

        assert!(!slots.fill("a", "vm-1"));
        assert!(slots.fill("b", "vm-1"));
        assert!(!slots.fill("b", "vm-2"));
        assert_eq!(slots.vm_ids().collect::<Vec<_>>(), vec!["vm-pre", "vm-1"]);

        assert!(!slots.release("a", "vm-1"));
        assert!(slots.release("b", "vm-1"));
        assert!(!slots.release("b", "vm-1"));
        assert_eq!(slots.vm_ids().collect::<Vec<_>>(), vec!["vm-pre"]);
    }

    #[test]
    fn duplicate_slot_name_replaces_template() {
        let mut slots = ClaimSlots::default();
        slots.push("a", "t1").push("a", "t2");
        assert_eq!(slots.len(), 1);
        assert_eq!(slots.get("a").map(|s| s.template.as_str()), Some("t2"));
    }
}
