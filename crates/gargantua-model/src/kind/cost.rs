use serde::{Deserialize, Serialize};

use crate::cost::{CostReport, CostView, TimeUnit, report};

/// One billed object inside a cost group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostResource {
    /// Name of the billed object.
    pub id: String,
    /// Kind of the billed object.
    pub kind: String,
    pub base_price: f64,
    pub time_unit: TimeUnit,
    pub creation_unix_timestamp: i64,
    /// `0` while the object is still live.
    #[serde(default)]
    pub deletion_unix_timestamp: i64,
}

impl CostResource {
    pub fn is_live(&self) -> bool {
        self.deletion_unix_timestamp == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSpec {
    pub cost_group: String,
    #[serde(default)]
    pub resources: Vec<CostResource>,
}

impl CostSpec {
    /// Insert or replace the entry for `(kind, id)`.
    ///
    /// Returns `true` if the spec changed.
    pub fn upsert(&mut self, resource: CostResource) -> bool {
        match self
            .resources
            .iter_mut()
            .find(|r| r.kind == resource.kind && r.id == resource.id)
        {
            Some(existing) if *existing == resource => false,
            Some(existing) => {
                *existing = resource;
                true
            }
            None => {
                self.resources.push(resource);
                true
            }
        }
    }

    /// Record deletion of `(kind, id)` at `at` unless already recorded.
    ///
    /// Returns `true` if the spec changed.
    pub fn mark_deleted(&mut self, kind: &str, id: &str, at: i64) -> bool {
        match self
            .resources
            .iter_mut()
            .find(|r| r.kind == kind && r.id == id)
        {
            Some(r) if r.is_live() => {
                r.deletion_unix_timestamp = at;
                true
            }
            _ => false,
        }
    }
}

resource!(
    /// Aggregated consumption of one cost group.
    Cost,
    "Cost",
    "costs",
    CostSpec,
    ()
);

impl Cost {
    /// Cost report of this group for `view`, using `now` for live resources.
    pub fn report(&self, view: CostView, now: i64) -> CostReport {
        report(&self.spec.cost_group, &self.spec.resources, view, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(kind: &str, id: &str) -> CostResource {
        CostResource {
            id: id.into(),
            kind: kind.into(),
            base_price: 1.0,
            time_unit: TimeUnit::Hours,
            creation_unix_timestamp: 100,
            deletion_unix_timestamp: 0,
        }
    }

    #[test]
    fn upsert_is_unique_per_kind_and_id() {
        let mut spec = CostSpec::default();
        assert!(spec.upsert(res("VirtualMachine", "vm-1")));
        assert!(!spec.upsert(res("VirtualMachine", "vm-1")));
        assert!(spec.upsert(res("Session", "vm-1")));
        assert_eq!(spec.resources.len(), 2);

        let mut changed = res("VirtualMachine", "vm-1");
        changed.base_price = 2.0;
        assert!(spec.upsert(changed));
        assert_eq!(spec.resources.len(), 2);
        assert_eq!(spec.resources[0].base_price, 2.0);
    }

    #[test]
    fn mark_deleted_only_once() {
        let mut spec = CostSpec::default();
        spec.upsert(res("VirtualMachine", "vm-1"));

        assert!(spec.mark_deleted("VirtualMachine", "vm-1", 500));
        assert!(!spec.mark_deleted("VirtualMachine", "vm-1", 900));
        assert!(!spec.mark_deleted("VirtualMachine", "missing", 900));
        assert_eq!(spec.resources[0].deletion_unix_timestamp, 500);
    }
}
