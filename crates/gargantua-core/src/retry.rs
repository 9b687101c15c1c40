//! Conflict retry for read-modify-write cycles against the store.
//!
//! Each attempt re-reads the object, re-applies the mutation and writes it
//! back. Only [`StoreError::Conflict`] is retried; every other error surfaces
//! immediately. A mutation that reports no change skips the write.
use gargantua_model::Resource;
use tracing::debug;

use crate::store::{Api, StoreError, StoreResult};

/// Attempts per read-modify-write cycle.
pub const CONFLICT_RETRIES: usize = 5;

/// Which half of the object a mutation writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Write {
    /// Metadata and spec through `update`.
    Spec,
    /// Status through `update_status`.
    Status,
}

/// Apply `f` to the stored object and write it back, retrying on conflict.
///
/// `f` returns `true` if it changed the object. Returns the stored state
/// after the call.
pub async fn mutate<K, F>(
    api: &dyn Api<K>,
    write: Write,
    namespace: &str,
    name: &str,
    mut f: F,
) -> StoreResult<K>
where
    K: Resource,
    F: FnMut(&mut K) -> bool + Send,
{
    let mut last = None;
    for attempt in 0..CONFLICT_RETRIES {
        let mut obj = api.get(namespace, name).await?;
        if !f(&mut obj) {
            return Ok(obj);
        }
        let res = match write {
            Write::Spec => api.update(obj).await,
            Write::Status => api.update_status(obj).await,
        };
        match res {
            Ok(stored) => return Ok(stored),
            Err(e) if e.is_conflict() => {
                debug!(kind = K::KIND, name, attempt, error = %e, "conflict, re-reading");
                last = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last.unwrap_or_else(|| StoreError::Conflict {
        kind: K::KIND,
        key: name.to_string(),
        reason: "retries exhausted".into(),
    }))
}

/// [`mutate`] on the spec.
pub async fn update_spec<K, F>(api: &dyn Api<K>, namespace: &str, name: &str, f: F) -> StoreResult<K>
where
    K: Resource,
    F: FnMut(&mut K) -> bool + Send,
{
    mutate(api, Write::Spec, namespace, name, f).await
}

/// [`mutate`] on the status.
pub async fn update_status<K, F>(
    api: &dyn Api<K>,
    namespace: &str,
    name: &str,
    f: F,
) -> StoreResult<K>
where
    K: Resource,
    F: FnMut(&mut K) -> bool + Send,
{
    mutate(api, Write::Status, namespace, name, f).await
}
