use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::ANNOTATION_PROVISIONER;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSpec {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub provider: String,
    /// Per-template cap on VMs living in this environment.
    #[serde(default)]
    pub count_capacity: BTreeMap<String, u32>,
    /// Template name to provider image mapping.
    #[serde(default)]
    pub template_mapping: BTreeMap<String, String>,
}

resource!(
    /// Backing environment (cloud account, vSphere cluster, static inventory).
    Environment,
    "Environment",
    "environments",
    EnvironmentSpec,
    ()
);

impl Environment {
    /// Capacity for `template`; `None` means the template is not offered here.
    pub fn capacity(&self, template: &str) -> Option<u32> {
        self.spec.count_capacity.get(template).copied()
    }

    /// External provisioner named by annotation, if any.
    pub fn provisioner(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get(ANNOTATION_PROVISIONER)
            .filter(|p| !p.is_empty())
    }
}
