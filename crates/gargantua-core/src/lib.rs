//! Reconciliation runtime of the Gargantua control plane.
//!
//! Store contract and in-memory store, shared informers, work queues, the
//! controller worker loop, conflict retry, sharding and supervision.
pub mod clock;
pub mod error;
pub mod informer;
pub mod map;
pub mod metrics;
pub mod policy;
pub mod queue;
pub mod retry;
pub mod runtime;
pub mod shard;
pub mod store;
pub mod supervisor;

pub use policy::TaskPolicy;
pub use supervisor::SupervisorApi;

pub mod prelude {
    pub use crate::clock::{Clock, ClockHandle, ManualClock, SystemClock};
    pub use crate::error::CoreError;
    pub use crate::informer::{Informer, InformerSet, Lister, Notification};
    pub use crate::metrics::{MetricsBackend, MetricsHandle};
    pub use crate::runtime::{
        Action, Controller, ControllerSettings, QueueHandle, ReconcileError, ReconcileResult,
        Reconciler, Runnable,
    };
    pub use crate::shard::Shard;
    pub use crate::store::{Api, ApiHandle, ListParams, OptionalExt, Store, StoreError};
    pub use crate::supervisor::SupervisorApi;
}
