//! Resource store contract.
//!
//! Typed CRUD with optimistic concurrency, label-selector list, collection
//! delete and watch. [`MemoryApi`] is the in-process implementation; the
//! controllers only see [`Api`].
use std::sync::Arc;

use async_trait::async_trait;
use gargantua_model::{Resource, Selector};

mod error;
pub use error::{OptionalExt, StoreError, StoreResult, ignore_not_found};

mod watch;
pub use watch::{WatchEvent, WatchStream};

mod memory;
pub use memory::MemoryApi;

mod bundle;
pub use bundle::Store;

/// Scope of list, watch and collection-delete calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    /// `None` means all namespaces.
    pub namespace: Option<String>,
    pub selector: Selector,
}

impl ListParams {
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            selector: Selector::everything(),
        }
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn matches<K: Resource>(&self, obj: &K) -> bool {
        let meta = obj.meta();
        self.namespace
            .as_deref()
            .is_none_or(|ns| ns == meta.namespace)
            && self.selector.matches(&meta.labels)
    }
}

/// Result of a list call.
#[derive(Debug, Clone)]
pub struct ObjectList<K> {
    /// Items in key order.
    pub items: Vec<K>,
    /// Store version at the time of the list; a watch opened before the list
    /// delivers every change after it.
    pub resource_version: u64,
}

/// Typed access to one resource kind.
///
/// `update` replaces metadata and spec and keeps the stored status;
/// `update_status` replaces status and keeps the stored metadata and spec.
/// Both fail with [`StoreError::Conflict`] when the caller's resource version is stale.
#[async_trait]
pub trait Api<K: Resource>: Send + Sync {
    async fn create(&self, obj: K) -> StoreResult<K>;

    async fn get(&self, namespace: &str, name: &str) -> StoreResult<K>;

    async fn update(&self, obj: K) -> StoreResult<K>;

    async fn update_status(&self, obj: K) -> StoreResult<K>;

    async fn delete(&self, namespace: &str, name: &str) -> StoreResult<()>;

    /// Delete every object matching `params`; returns how many were removed.
    async fn delete_collection(&self, params: &ListParams) -> StoreResult<usize>;

    async fn list(&self, params: &ListParams) -> StoreResult<ObjectList<K>>;

    async fn watch(&self, params: &ListParams) -> StoreResult<WatchStream<K>>;
}

/// Shared handle to one kind's API.
pub type ApiHandle<K> = Arc<dyn Api<K>>;
