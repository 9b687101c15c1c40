use std::sync::Arc;

use gargantua_model::{
    AccessCode, Cost, DynamicBindConfiguration, Environment, OneTimeAccessCode, PasswordResetToken,
    Progress, ScheduledEvent, Session, Setting, VirtualMachine, VirtualMachineClaim,
    VirtualMachineSet,
};

use super::{ApiHandle, MemoryApi};
use crate::clock::ClockHandle;

/// One API handle per kind the control plane reads or writes.
#[derive(Clone)]
pub struct Store {
    pub events: ApiHandle<ScheduledEvent>,
    pub vm_sets: ApiHandle<VirtualMachineSet>,
    pub dbcs: ApiHandle<DynamicBindConfiguration>,
    pub vms: ApiHandle<VirtualMachine>,
    pub claims: ApiHandle<VirtualMachineClaim>,
    pub access_codes: ApiHandle<AccessCode>,
    pub otacs: ApiHandle<OneTimeAccessCode>,
    pub sessions: ApiHandle<Session>,
    pub tokens: ApiHandle<PasswordResetToken>,
    pub costs: ApiHandle<Cost>,
    pub environments: ApiHandle<Environment>,
    pub settings: ApiHandle<Setting>,
    pub progress: ApiHandle<Progress>,
}

impl Store {
    /// Store backed by [`MemoryApi`] tables.
    pub fn in_memory(clock: ClockHandle) -> Self {
        Self {
            events: Arc::new(MemoryApi::new(clock.clone())),
            vm_sets: Arc::new(MemoryApi::new(clock.clone())),
            dbcs: Arc::new(MemoryApi::new(clock.clone())),
            vms: Arc::new(MemoryApi::new(clock.clone())),
            claims: Arc::new(MemoryApi::new(clock.clone())),
            access_codes: Arc::new(MemoryApi::new(clock.clone())),
            otacs: Arc::new(MemoryApi::new(clock.clone())),
            sessions: Arc::new(MemoryApi::new(clock.clone())),
            tokens: Arc::new(MemoryApi::new(clock.clone())),
            costs: Arc::new(MemoryApi::new(clock.clone())),
            environments: Arc::new(MemoryApi::new(clock.clone())),
            settings: Arc::new(MemoryApi::new(clock.clone())),
            progress: Arc::new(MemoryApi::new(clock)),
        }
    }
}
