use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::parse_wall_clock;
use crate::error::ModelResult;

/// Desired state of a scheduled event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEventSpec {
    pub creator: String,
    /// Human readable name.
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Wall-clock start (RFC 3339 or Unix date).
    pub start_time: String,
    /// Wall-clock end (RFC 3339 or Unix date).
    pub end_time: String,
    #[serde(default)]
    pub on_demand: bool,
    #[serde(default)]
    pub printable: bool,
    #[serde(default)]
    pub restricted_bind: bool,
    #[serde(default)]
    pub restricted_bind_value: String,
    /// `environment -> template -> count`.
    #[serde(default)]
    pub required_vms: BTreeMap<String, BTreeMap<String, u32>>,
    pub access_code: String,
    #[serde(default)]
    pub scenarios: Vec<String>,
    #[serde(default)]
    pub courses: Vec<String>,
}

/// Observed lifecycle of a scheduled event.
///
/// `provisioned`, `ready` and `finished` only move forward; `ready` drops back
/// to `false` when the event finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEventStatus {
    #[serde(default)]
    pub vm_sets: Vec<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub provisioned: bool,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub finished: bool,
}

resource!(
    /// Time-bounded block of capacity linked to one access code.
    ScheduledEvent,
    "ScheduledEvent",
    "scheduledevents",
    ScheduledEventSpec,
    ScheduledEventStatus
);

impl ScheduledEvent {
    pub fn start(&self) -> ModelResult<OffsetDateTime> {
        parse_wall_clock(&self.spec.start_time)
    }

    pub fn end(&self) -> ModelResult<OffsetDateTime> {
        parse_wall_clock(&self.spec.end_time)
    }

    /// Bind domain of the event: its own name when restricted, empty otherwise.
    pub fn bind_value(&self) -> &str {
        if self.spec.restricted_bind {
            &self.metadata.name
        } else {
            ""
        }
    }

    /// Environments named by the required VMs, in key order.
    pub fn environments(&self) -> impl Iterator<Item = &str> {
        self.spec.required_vms.keys().map(String::as_str)
    }

    /// `(environment, template, count)` triples with a positive count.
    pub fn required(&self) -> impl Iterator<Item = (&str, &str, u32)> {
        self.spec.required_vms.iter().flat_map(|(env, templates)| {
            templates
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(move |(tmpl, count)| (env.as_str(), tmpl.as_str(), *count))
        })
    }
}
