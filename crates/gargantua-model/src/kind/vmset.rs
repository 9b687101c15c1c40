use serde::{Deserialize, Serialize};

use super::VmPhase;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSetSpec {
    pub count: u32,
    pub environment: String,
    pub vm_template: String,
    pub base_name: String,
    #[serde(default)]
    pub restricted_bind: bool,
    #[serde(default)]
    pub restricted_bind_value: String,
}

/// Provisioning state of one machine of a set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineState {
    pub vm_name: String,
    pub phase: VmPhase,
    #[serde(default)]
    pub tainted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSetStatus {
    /// Machines that exist for this set.
    #[serde(default)]
    pub provisioned: u32,
    /// Machines that are neither bound nor tainted.
    #[serde(default)]
    pub available: u32,
    #[serde(default)]
    pub machines: Vec<MachineState>,
}

resource!(
    /// Pool of static VMs of one template in one environment, owned by a scheduled event.
    VirtualMachineSet,
    "VirtualMachineSet",
    "virtualmachinesets",
    VirtualMachineSetSpec,
    VirtualMachineSetStatus
);
