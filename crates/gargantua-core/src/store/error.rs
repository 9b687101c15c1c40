use thiserror::Error;

/// Errors returned by a resource store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("conflict on {kind} {key}: {reason}")]
    Conflict {
        kind: &'static str,
        key: String,
        reason: String,
    },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: &'static str, key: String },

    #[error("invalid {kind}: {reason}")]
    Invalid { kind: &'static str, reason: String },

    /// The watch fell too far behind; the caller must list again.
    #[error("watch on {kind} expired")]
    Gone { kind: &'static str },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Map `NotFound` to `Ok(None)`.
pub trait OptionalExt<T> {
    fn optional(self) -> StoreResult<Option<T>>;
}

impl<T> OptionalExt<T> for StoreResult<T> {
    fn optional(self) -> StoreResult<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Treat `NotFound` as success; used for idempotent deletes.
pub fn ignore_not_found(res: StoreResult<()>) -> StoreResult<()> {
    match res {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}
