use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use gargantua_model::{Resource, object_key};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use super::{Api, ListParams, ObjectList, StoreError, StoreResult, WatchEvent, WatchStream};
use crate::clock::ClockHandle;

/// Buffered events per watcher before it is considered lagging.
const WATCH_BUFFER: usize = 1024;

struct Table<K> {
    objects: BTreeMap<String, K>,
    version: u64,
}

/// In-process store for one kind.
///
/// Every mutation bumps a per-kind version counter that doubles as the
/// object's resource version. Watch events are broadcast while the table lock
/// is held, so every watcher sees mutations in version order.
pub struct MemoryApi<K: Resource> {
    table: Mutex<Table<K>>,
    events: broadcast::Sender<WatchEvent<K>>,
    clock: ClockHandle,
}

impl<K: Resource> MemoryApi<K> {
    pub fn new(clock: ClockHandle) -> Self {
        let (events, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            table: Mutex::new(Table {
                objects: BTreeMap::new(),
                version: 0,
            }),
            events,
            clock,
        }
    }

    fn table(&self) -> MutexGuard<'_, Table<K>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, ev: WatchEvent<K>) {
        // No receivers is fine.
        let _ = self.events.send(ev);
    }

    fn not_found(key: String) -> StoreError {
        StoreError::NotFound { kind: K::KIND, key }
    }

    /// Write `next` over the stored object under `key` after the version check.
    fn replace(&self, key: String, incoming_rv: u64, next: impl FnOnce(&K) -> K) -> StoreResult<K> {
        let mut table = self.table();
        let stored = table
            .objects
            .get(&key)
            .ok_or_else(|| Self::not_found(key.clone()))?;
        let stored_rv = stored.meta().resource_version;
        if incoming_rv != stored_rv {
            return Err(StoreError::Conflict {
                kind: K::KIND,
                key,
                reason: format!("resource version {incoming_rv} is stale, current is {stored_rv}"),
            });
        }

        let mut updated = next(stored);
        {
            let meta = updated.meta_mut();
            meta.resource_version = stored_rv;
            meta.uid = stored.meta().uid;
            meta.creation_timestamp = stored.meta().creation_timestamp;
        }
        if &updated == stored {
            return Ok(updated);
        }

        table.version += 1;
        updated.meta_mut().resource_version = table.version;
        table.objects.insert(key, updated.clone());
        self.publish(WatchEvent::Modified(updated.clone()));
        Ok(updated)
    }
}

#[async_trait]
impl<K: Resource> Api<K> for MemoryApi<K> {
    async fn create(&self, mut obj: K) -> StoreResult<K> {
        if obj.meta().name.trim().is_empty() {
            return Err(StoreError::Invalid {
                kind: K::KIND,
                reason: "name must not be empty".into(),
            });
        }
        let key = obj.key();
        let now = self.clock.now();

        let mut table = self.table();
        if table.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists { kind: K::KIND, key });
        }
        table.version += 1;
        let meta = obj.meta_mut();
        meta.uid = Uuid::new_v4();
        meta.resource_version = table.version;
        meta.creation_timestamp = Some(now);
        meta.deletion_timestamp = None;

        trace!(kind = K::KIND, key = %key, rv = table.version, "object created");
        table.objects.insert(key, obj.clone());
        self.publish(WatchEvent::Added(obj.clone()));
        Ok(obj)
    }

    async fn get(&self, namespace: &str, name: &str) -> StoreResult<K> {
        let key = object_key(namespace, name);
        self.table()
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| Self::not_found(key))
    }

    async fn update(&self, obj: K) -> StoreResult<K> {
        let rv = obj.meta().resource_version;
        self.replace(obj.key(), rv, |stored| {
            let mut next = obj.clone();
            *next.status_mut() = stored.status().clone();
            next
        })
    }

    async fn update_status(&self, obj: K) -> StoreResult<K> {
        let rv = obj.meta().resource_version;
        self.replace(obj.key(), rv, |stored| {
            let mut next = stored.clone();
            *next.status_mut() = obj.status().clone();
            next
        })
    }

    async fn delete(&self, namespace: &str, name: &str) -> StoreResult<()> {
        let key = object_key(namespace, name);
        let now = self.clock.now();

        let mut table = self.table();
        let mut obj = table
            .objects
            .remove(&key)
            .ok_or_else(|| Self::not_found(key.clone()))?;
        table.version += 1;
        obj.meta_mut().resource_version = table.version;
        obj.meta_mut().deletion_timestamp = Some(now);

        trace!(kind = K::KIND, key = %key, rv = table.version, "object deleted");
        self.publish(WatchEvent::Deleted(obj));
        Ok(())
    }

    async fn delete_collection(&self, params: &ListParams) -> StoreResult<usize> {
        let now = self.clock.now();
        let mut table = self.table();
        let keys: Vec<String> = table
            .objects
            .iter()
            .filter(|(_, o)| params.matches(*o))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &keys {
            if let Some(mut obj) = table.objects.remove(key) {
                table.version += 1;
                obj.meta_mut().resource_version = table.version;
                obj.meta_mut().deletion_timestamp = Some(now);
                self.publish(WatchEvent::Deleted(obj));
            }
        }
        Ok(keys.len())
    }

    async fn list(&self, params: &ListParams) -> StoreResult<ObjectList<K>> {
        let table = self.table();
        Ok(ObjectList {
            items: table
                .objects
                .values()
                .filter(|o| params.matches(*o))
                .cloned()
                .collect(),
            resource_version: table.version,
        })
    }

    async fn watch(&self, params: &ListParams) -> StoreResult<WatchStream<K>> {
        Ok(WatchStream::new(self.events.subscribe(), params.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gargantua_model::{
        Labels, ObjectMeta, Selector, VirtualMachine, VirtualMachineSpec, VmPhase,
    };
    use time::macros::datetime;

    use super::*;
    use crate::clock::ManualClock;

    fn api() -> MemoryApi<VirtualMachine> {
        MemoryApi::new(Arc::new(ManualClock::new(datetime!(2024-01-02 15:00:00 UTC))))
    }

    fn vm(name: &str, env: &str) -> VirtualMachine {
        VirtualMachine::new(
            ObjectMeta::named(name).with_labels(Labels::new().with("environment", env)),
            VirtualMachineSpec {
                template_id: "tmpl-x".into(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn create_assigns_identity_and_rejects_duplicates() {
        let api = api();
        let created = api.create(vm("vm-1", "env-a")).await.unwrap();
        assert_eq!(created.metadata.resource_version, 1);
        assert!(!created.metadata.uid.is_nil());
        assert_eq!(
            created.metadata.creation_timestamp,
            Some(datetime!(2024-01-02 15:00:00 UTC))
        );

        let err = api.create(vm("vm-1", "env-a")).await.unwrap_err();
        assert!(err.is_already_exists());

        let err = api.create(vm("  ", "env-a")).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid { .. }));
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let api = api();
        let created = api.create(vm("vm-1", "env-a")).await.unwrap();

        let mut first = created.clone();
        first.spec.user_id = "u-1".into();
        let updated = api.update(first).await.unwrap();
        assert_eq!(updated.metadata.resource_version, 2);

        let mut stale = created;
        stale.spec.user_id = "u-2".into();
        let err = api.update(stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn spec_and_status_updates_are_independent() {
        let api = api();
        let created = api.create(vm("vm-1", "env-a")).await.unwrap();

        let mut with_status = created.clone();
        with_status.status.phase = VmPhase::Running;
        with_status.spec.user_id = "ignored".into();
        let after_status = api.update_status(with_status).await.unwrap();
        assert_eq!(after_status.status.phase, VmPhase::Running);
        assert_eq!(after_status.spec.user_id, "");

        let mut with_spec = after_status.clone();
        with_spec.spec.user_id = "u-1".into();
        with_spec.status.phase = VmPhase::Terminating;
        let after_spec = api.update(with_spec).await.unwrap();
        assert_eq!(after_spec.spec.user_id, "u-1");
        assert_eq!(after_spec.status.phase, VmPhase::Running);
    }

    #[tokio::test]
    async fn noop_update_keeps_version() {
        let api = api();
        let created = api.create(vm("vm-1", "env-a")).await.unwrap();
        let same = api.update(created.clone()).await.unwrap();
        assert_eq!(same.metadata.resource_version, created.metadata.resource_version);
        assert_eq!(api.list(&ListParams::default()).await.unwrap().resource_version, 1);
    }

    #[tokio::test]
    async fn list_and_delete_collection_by_selector() {
        let api = api();
        for (name, env) in [("vm-1", "env-a"), ("vm-2", "env-b"), ("vm-3", "env-a")] {
            api.create(vm(name, env)).await.unwrap();
        }
        let params =
            ListParams::default().with_selector(Selector::everything().eq("environment", "env-a"));

        let list = api.list(&params).await.unwrap();
        let names: Vec<_> = list.items.iter().map(|v| v.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["vm-1", "vm-3"]);
        assert_eq!(list.resource_version, 3);

        assert_eq!(api.delete_collection(&params).await.unwrap(), 2);
        assert_eq!(api.list(&ListParams::default()).await.unwrap().items.len(), 1);
        assert!(api.get("gargantua", "vm-1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn watch_delivers_changes_in_order() {
        let api = api();
        let mut watch = api.watch(&ListParams::default()).await.unwrap();

        let created = api.create(vm("vm-1", "env-a")).await.unwrap();
        let mut next = created.clone();
        next.spec.user_id = "u-1".into();
        api.update(next).await.unwrap();
        api.delete("gargantua", "vm-1").await.unwrap();

        assert!(matches!(watch.recv().await.unwrap(), WatchEvent::Added(_)));
        assert!(matches!(watch.recv().await.unwrap(), WatchEvent::Modified(_)));
        let deleted = watch.recv().await.unwrap();
        assert!(matches!(deleted, WatchEvent::Deleted(_)));
        assert_eq!(deleted.resource_version(), 3);
        assert!(deleted.object().metadata.deletion_timestamp.is_some());
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let api = api();
        assert!(api.delete("gargantua", "nope").await.unwrap_err().is_not_found());
    }
}
