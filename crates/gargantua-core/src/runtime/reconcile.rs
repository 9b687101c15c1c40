use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::store::StoreError;

/// Outcome of a successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing scheduled; the key comes back on the next change.
    Done,
    /// Reconcile again after the given delay.
    RequeueAfter(Duration),
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Bad input on the object itself; retrying cannot help.
    #[error("validation: {0}")]
    Validation(String),

    /// Placement could not be satisfied; the caller already tainted the session.
    #[error("capacity exhausted: {0}")]
    Capacity(String),

    #[error("internal: {0}")]
    Internal(String),
}

/// What the worker does with a failed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Drop the key and reset its backoff.
    Forget,
    /// Re-enqueue with exponential backoff.
    Backoff,
}

impl ReconcileError {
    pub fn policy(&self) -> ErrorPolicy {
        match self {
            ReconcileError::Store(e) if e.is_not_found() => ErrorPolicy::Forget,
            ReconcileError::Validation(_) | ReconcileError::Capacity(_) => ErrorPolicy::Forget,
            ReconcileError::Store(_) | ReconcileError::Internal(_) => ErrorPolicy::Backoff,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::Store(StoreError::NotFound { .. }) => "not_found",
            ReconcileError::Store(StoreError::Conflict { .. }) => "conflict",
            ReconcileError::Store(_) => "store",
            ReconcileError::Validation(_) => "validation",
            ReconcileError::Capacity(_) => "capacity",
            ReconcileError::Internal(_) => "internal",
        }
    }
}

impl From<gargantua_model::ModelError> for ReconcileError {
    fn from(e: gargantua_model::ModelError) -> Self {
        ReconcileError::Validation(e.to_string())
    }
}

pub type ReconcileResult = Result<Action, ReconcileError>;

/// Per-kind reconcile logic.
///
/// Receives `namespace/name` keys. Must be idempotent: the same key may be
/// reconciled any number of times without intervening changes.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn reconcile(&self, key: &str) -> ReconcileResult;
}
