use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use gargantua_model::{Resource, Selector, object_key};
use tokio::sync::watch;

/// Difference produced when the cache absorbs a full list.
pub(crate) enum Change<K> {
    Added(Arc<K>),
    Updated(Arc<K>, Arc<K>),
    Deleted(Arc<K>),
}

struct State<K> {
    objects: BTreeMap<String, Arc<K>>,
    /// `(label key, label value) -> object keys`.
    index: HashMap<(String, String), BTreeSet<String>>,
}

impl<K: Resource> State<K> {
    fn index_add(&mut self, key: &str, obj: &K) {
        for (k, v) in obj.labels().iter() {
            self.index
                .entry((k.to_string(), v.to_string()))
                .or_default()
                .insert(key.to_string());
        }
    }

    fn index_remove(&mut self, key: &str, obj: &K) {
        for (k, v) in obj.labels().iter() {
            let slot = (k.to_string(), v.to_string());
            if let Some(keys) = self.index.get_mut(&slot) {
                keys.remove(key);
                if keys.is_empty() {
                    self.index.remove(&slot);
                }
            }
        }
    }

    fn put(&mut self, key: String, obj: Arc<K>) -> Option<Arc<K>> {
        let old = self.objects.insert(key.clone(), obj.clone());
        if let Some(prev) = &old {
            self.index_remove(&key, prev);
        }
        self.index_add(&key, &obj);
        old
    }

    fn take(&mut self, key: &str) -> Option<Arc<K>> {
        let old = self.objects.remove(key)?;
        self.index_remove(key, &old);
        Some(old)
    }
}

/// Indexed in-memory copy of one kind, keyed by `namespace/name`.
pub(crate) struct Cache<K> {
    state: RwLock<State<K>>,
    version: watch::Sender<u64>,
    synced: watch::Sender<bool>,
}

impl<K: Resource> Cache<K> {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(State {
                objects: BTreeMap::new(),
                index: HashMap::new(),
            }),
            version: watch::Sender::new(0),
            synced: watch::Sender::new(false),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State<K>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State<K>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<K>> {
        self.read().objects.get(key).cloned()
    }

    pub(crate) fn upsert(&self, obj: K) -> (Option<Arc<K>>, Arc<K>) {
        let key = obj.key();
        let obj = Arc::new(obj);
        let old = self.write().put(key, obj.clone());
        (old, obj)
    }

    pub(crate) fn remove(&self, key: &str) -> Option<Arc<K>> {
        self.write().take(key)
    }

    /// Swap in a full list and report what changed.
    pub(crate) fn replace(&self, items: Vec<K>) -> Vec<Change<K>> {
        let mut changes = Vec::new();
        let mut state = self.write();

        let mut seen = BTreeSet::new();
        for obj in items {
            let key = obj.key();
            seen.insert(key.clone());
            let obj = Arc::new(obj);
            match state.put(key, obj.clone()) {
                None => changes.push(Change::Added(obj)),
                Some(old) => {
                    if old.meta().resource_version != obj.meta().resource_version {
                        changes.push(Change::Updated(old, obj));
                    }
                }
            }
        }

        let stale: Vec<String> = state
            .objects
            .keys()
            .filter(|k| !seen.contains(*k))
            .cloned()
            .collect();
        for key in stale {
            if let Some(old) = state.take(&key) {
                changes.push(Change::Deleted(old));
            }
        }
        changes
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<K>> {
        self.read().objects.values().cloned().collect()
    }

    /// Objects matching `selector` in key order, optionally limited to one namespace.
    pub(crate) fn select(&self, namespace: Option<&str>, selector: &Selector) -> Vec<K> {
        let state = self.read();
        let keep = |o: &&K| {
            namespace.is_none_or(|ns| ns == o.meta().namespace) && selector.matches(o.labels())
        };

        match selector.equality_hint() {
            Some((k, v)) => state
                .index
                .get(&(k.to_string(), v.to_string()))
                .into_iter()
                .flatten()
                .filter_map(|key| state.objects.get(key))
                .map(Arc::as_ref)
                .filter(keep)
                .cloned()
                .collect(),
            None => state
                .objects
                .values()
                .map(Arc::as_ref)
                .filter(keep)
                .cloned()
                .collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.read().objects.len()
    }

    pub(crate) fn observe(&self, rv: u64) {
        self.version.send_if_modified(|v| {
            if rv > *v {
                *v = rv;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn mark_synced(&self) {
        self.synced.send_replace(true);
    }

    pub(crate) fn synced(&self) -> watch::Receiver<bool> {
        self.synced.subscribe()
    }

    pub(crate) fn versions(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

/// Read-only view of an informer cache.
///
/// Reads may be stale; writers always go through the store.
pub struct Lister<K> {
    cache: Arc<Cache<K>>,
}

impl<K> Clone for Lister<K> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

impl<K: Resource> Lister<K> {
    pub(crate) fn new(cache: Arc<Cache<K>>) -> Self {
        Self { cache }
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<K> {
        self.cache
            .get(&object_key(namespace, name))
            .map(|o| (*o).clone())
    }

    /// Matching objects across all namespaces, in key order.
    pub fn list(&self, selector: &Selector) -> Vec<K> {
        self.cache.select(None, selector)
    }

    /// Matching objects in one namespace, in key order.
    pub fn list_in(&self, namespace: &str, selector: &Selector) -> Vec<K> {
        self.cache.select(Some(namespace), selector)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_synced(&self) -> bool {
        *self.cache.synced().borrow()
    }

    /// Wait until the cache has absorbed every change up to `rv`.
    pub async fn wait_for_version(&self, rv: u64) {
        let mut versions = self.cache.versions();
        // The sender lives as long as the cache, which this lister keeps alive.
        let _ = versions.wait_for(|v| *v >= rv).await;
    }
}
