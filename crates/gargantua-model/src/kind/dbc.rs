use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicBindConfigurationSpec {
    pub environment: String,
    pub base_name: String,
    #[serde(default)]
    pub restricted_bind: bool,
    #[serde(default)]
    pub restricted_bind_value: String,
    /// Per-template cap on dynamically created VMs for the owning event.
    #[serde(default)]
    pub burst_count_capacity: BTreeMap<String, u32>,
}

resource!(
    /// Burst capacity envelope of one scheduled event in one environment.
    DynamicBindConfiguration,
    "DynamicBindConfiguration",
    "dynamicbindconfigurations",
    DynamicBindConfigurationSpec,
    ()
);
