//! Controller runtime: reconcilers, worker loops and the supervisable unit trait.
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;

mod reconcile;
pub use reconcile::{Action, ErrorPolicy, ReconcileError, ReconcileResult, Reconciler};

mod handle;
pub use handle::QueueHandle;

mod controller;
pub use controller::{Controller, ControllerSettings};

/// Long-running unit (informer or controller) that runs until cancelled.
#[async_trait]
pub trait Runnable: Send + Sync + 'static {
    /// Stable name; used as the supervisor slot.
    fn name(&self) -> String;

    async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), CoreError>;
}
