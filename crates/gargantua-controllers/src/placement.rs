//! Placement of a claim's VMs onto dynamic bind configurations.
//!
//! The planner is pure: usage counts come from a [`Usage`] view so the same
//! code runs against the live accountant and against fixed numbers in tests.
//!
//! Two passes:
//! 1. Single: the first DBC (in list order) that fits every requested VM.
//! 2. Split: slot by slot, the first DBC with room left after the VMs
//!    already assigned in this pass.
use std::collections::{BTreeSet, HashMap};

use gargantua_model::{ClaimSlots, DynamicBindConfiguration, Environment, Resource};
use thiserror::Error;

/// Live VM counts, as seen by the caller.
pub trait Usage {
    /// Non-terminating VMs of `template` in `environment`.
    fn count(&self, template: &str, environment: &str) -> u32;
    /// Same, restricted to VMs of `event`.
    fn count_for_event(&self, template: &str, environment: &str, event: &str) -> u32;
}

pub struct PlacementRequest<'a> {
    pub event: &'a str,
    /// Bind domain of the claim; empty for unrestricted.
    pub bind_value: &'a str,
    pub slots: &'a ClaimSlots,
    /// Candidate DBCs in list order.
    pub dbcs: &'a [DynamicBindConfiguration],
    pub environments: &'a [Environment],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub slot: String,
    pub template: String,
    pub environment: String,
    pub dbc: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub assignments: Vec<Assignment>,
    /// VMs were spread over more than one DBC.
    pub split: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("claim requests no VMs")]
    Empty,

    #[error("no capacity for slot {slot} ({template})")]
    NoCapacity { slot: String, template: String },
}

struct Candidate<'a> {
    dbc: &'a DynamicBindConfiguration,
    env: &'a Environment,
}

impl Candidate<'_> {
    /// Room for `extra` more VMs of `template` on top of live usage.
    fn fits(&self, usage: &dyn Usage, event: &str, template: &str, extra: u32) -> bool {
        let env = &self.dbc.spec.environment;
        let (Some(burst), Some(capacity)) = (
            self.dbc.spec.burst_count_capacity.get(template).copied(),
            self.env.capacity(template),
        ) else {
            return false;
        };
        usage.count_for_event(template, env, event) + extra <= burst
            && usage.count(template, env) + extra <= capacity
    }

    fn assign(&self, slot: &str, template: &str) -> Assignment {
        Assignment {
            slot: slot.to_string(),
            template: template.to_string(),
            environment: self.dbc.spec.environment.clone(),
            dbc: self.dbc.name().to_string(),
        }
    }
}

/// Compute where each slot of the claim goes.
pub fn plan(req: &PlacementRequest<'_>, usage: &dyn Usage) -> Result<Plan, PlacementError> {
    if req.slots.is_empty() {
        return Err(PlacementError::Empty);
    }

    let candidates: Vec<Candidate<'_>> = req
        .dbcs
        .iter()
        .filter(|d| d.spec.restricted_bind_value == req.bind_value)
        .filter_map(|dbc| {
            req.environments
                .iter()
                .find(|e| e.name() == dbc.spec.environment)
                .map(|env| Candidate { dbc, env })
        })
        .collect();

    // A single DBC only takes the whole claim while it stays strictly below
    // both burst and environment capacity afterwards.
    let required = req.slots.required();
    if let Some(c) = candidates.iter().find(|c| {
        required
            .iter()
            .all(|(tmpl, n)| c.fits(usage, req.event, tmpl, *n + 1))
    }) {
        return Ok(Plan {
            assignments: req
                .slots
                .iter()
                .map(|s| c.assign(&s.name, &s.template))
                .collect(),
            split: false,
        });
    }

    // Split pass. `taken` counts VMs this pass has already placed per
    // (environment, template) so each slot sees the remaining headroom.
    let mut taken: HashMap<(&str, &str), u32> = HashMap::new();
    let mut assignments = Vec::with_capacity(req.slots.len());
    for slot in req.slots.iter() {
        let chosen = candidates.iter().find(|c| {
            let reserved = taken
                .get(&(c.dbc.spec.environment.as_str(), slot.template.as_str()))
                .copied()
                .unwrap_or(0);
            c.fits(usage, req.event, &slot.template, reserved + 1)
        });
        let Some(c) = chosen else {
            return Err(PlacementError::NoCapacity {
                slot: slot.name.clone(),
                template: slot.template.clone(),
            });
        };
        *taken
            .entry((c.dbc.spec.environment.as_str(), slot.template.as_str()))
            .or_insert(0) += 1;
        assignments.push(c.assign(&slot.name, &slot.template));
    }

    let dbcs: BTreeSet<&str> = assignments.iter().map(|a| a.dbc.as_str()).collect();
    Ok(Plan {
        split: dbcs.len() > 1,
        assignments,
    })
}
