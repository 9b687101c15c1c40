//! Stored resource kinds.
//!
//! Every kind is a flat record of `metadata`, `spec` and `status`. Kinds without
//! observed state use `()` as their status type.
use std::fmt::Debug;

use crate::domain::{Labels, ObjectMeta, OwnerReference};

/// Common surface of every stored kind.
///
/// The store and the informers are generic over this trait; they never look
/// inside `spec` or `status`.
pub trait Resource: Debug + Clone + PartialEq + Send + Sync + 'static {
    /// Kind name as it appears in owner references (e.g. `ScheduledEvent`).
    const KIND: &'static str;
    /// Lowercase plural used by resource lists (e.g. `scheduledevents`).
    const PLURAL: &'static str;

    type Status: Debug + Clone + Default + PartialEq + Send + Sync + 'static;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
    fn status(&self) -> &Self::Status;
    fn status_mut(&mut self) -> &mut Self::Status;

    fn name(&self) -> &str {
        &self.meta().name
    }

    fn labels(&self) -> &Labels {
        &self.meta().labels
    }

    /// `namespace/name` key.
    fn key(&self) -> String {
        self.meta().key()
    }

    /// Owner reference pointing at this object as the managing controller.
    fn controller_ref(&self) -> OwnerReference {
        OwnerReference {
            kind: Self::KIND.to_string(),
            name: self.meta().name.clone(),
            uid: self.meta().uid,
            controller: true,
        }
    }
}

macro_rules! resource {
    ($(#[$attr:meta])* $name:ident, $kind:literal, $plural:literal, $spec:ty, $status:ty) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            pub metadata: $crate::domain::ObjectMeta,
            #[serde(default)]
            pub spec: $spec,
            #[serde(default)]
            pub status: $status,
        }

        impl $name {
            /// New object with default status.
            pub fn new(metadata: $crate::domain::ObjectMeta, spec: $spec) -> Self {
                Self {
                    metadata,
                    spec,
                    status: Default::default(),
                }
            }
        }

        impl $crate::kind::Resource for $name {
            const KIND: &'static str = $kind;
            const PLURAL: &'static str = $plural;
            type Status = $status;

            fn meta(&self) -> &$crate::domain::ObjectMeta {
                &self.metadata
            }
            fn meta_mut(&mut self) -> &mut $crate::domain::ObjectMeta {
                &mut self.metadata
            }
            fn status(&self) -> &$status {
                &self.status
            }
            fn status_mut(&mut self) -> &mut $status {
                &mut self.status
            }
        }
    };
}

mod access;
pub use access::{AccessCode, AccessCodeSpec, OneTimeAccessCode, OneTimeAccessCodeSpec};

mod claim;
pub use claim::{
    BindMode, ClaimSlot, ClaimSlots, VirtualMachineClaim, VirtualMachineClaimSpec,
    VirtualMachineClaimStatus,
};

mod cost;
pub use cost::{Cost, CostResource, CostSpec};

mod dbc;
pub use dbc::{DynamicBindConfiguration, DynamicBindConfigurationSpec};

mod environment;
pub use environment::{Environment, EnvironmentSpec};

mod event;
pub use event::{ScheduledEvent, ScheduledEventSpec, ScheduledEventStatus};

mod progress;
pub use progress::{Progress, ProgressSpec};

mod session;
pub use session::{Session, SessionSpec, SessionStatus};

mod setting;
pub use setting::{Setting, SettingSpec};

mod token;
pub use token::{PasswordResetToken, PasswordResetTokenSpec};

mod vm;
pub use vm::{VirtualMachine, VirtualMachineSpec, VirtualMachineStatus, VmPhase, VmType};

mod vmset;
pub use vmset::{MachineState, VirtualMachineSet, VirtualMachineSetSpec, VirtualMachineSetStatus};
