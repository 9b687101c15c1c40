//! Controllers of the Gargantua control plane.
//!
//! Scheduled events, VM sets, claim binding with dynamic placement, the
//! orphan sweeper, password-reset token expiry and cost accounting. Every
//! controller reads through the shared informers in [`Context`] and writes
//! through the store.
mod access;
mod capacity;
mod claim;
mod context;
mod cost;
mod event;
mod manager;
mod naming;
mod placement;
mod settings;
mod sweeper;
mod token;
mod upsert;
mod vmset;

#[cfg(test)]
mod testing;

pub use access::{AccessCodeResolver, AccessError, Resolved};
pub use capacity::CapacityAccountant;
pub use claim::VmClaimReconciler;
pub use context::{Context, ControllerConfig};
pub use cost::{CostConfigError, CostReconciler, CostTarget, load_targets, parse_targets};
pub use event::ScheduledEventReconciler;
pub use manager::Controllers;
pub use placement::{Assignment, Plan, PlacementError, PlacementRequest, Usage, plan};
pub use sweeper::VmSweeper;
pub use token::PasswordResetTokenReconciler;
pub use vmset::VmSetReconciler;
