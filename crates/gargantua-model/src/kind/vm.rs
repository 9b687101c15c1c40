use serde::{Deserialize, Serialize};

/// Provisioning phase, driven by the external provisioner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VmPhase {
    #[default]
    ReadyForProvisioning,
    Provisioned,
    Running,
    Terminating,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VmType {
    #[default]
    User,
    Shared,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    pub template_id: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub ssh_username: String,
    #[serde(default)]
    pub secret_name: String,
    /// Claim this VM is bound to; empty while free.
    #[serde(default)]
    pub vm_claim_id: String,
    #[serde(default)]
    pub user_id: String,
    /// Handed to the built-in provisioner; `false` when an external one owns it.
    #[serde(default)]
    pub provision: bool,
    /// Owning VMSet; empty for dynamically placed VMs.
    #[serde(default)]
    pub vm_set_id: String,
    #[serde(default, rename = "type")]
    pub vm_type: VmType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineStatus {
    #[serde(default)]
    pub phase: VmPhase,
    #[serde(default)]
    pub allocated: bool,
    #[serde(default)]
    pub tainted: bool,
    #[serde(default, rename = "publicIP")]
    pub public_ip: String,
    #[serde(default, rename = "privateIP")]
    pub private_ip: String,
    #[serde(default)]
    pub environment_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub ws_endpoint: String,
}

resource!(
    VirtualMachine,
    "VirtualMachine",
    "virtualmachines",
    VirtualMachineSpec,
    VirtualMachineStatus
);

impl VirtualMachine {
    pub fn is_running(&self) -> bool {
        self.status.phase == VmPhase::Running
    }

    pub fn is_terminating(&self) -> bool {
        self.status.phase == VmPhase::Terminating
    }

    /// Free for static assignment: not allocated, not tainted, not on its way out.
    pub fn is_free(&self) -> bool {
        !self.status.allocated
            && !self.status.tainted
            && !self.is_terminating()
            && self.spec.vm_claim_id.is_empty()
    }
}
