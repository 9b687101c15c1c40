//! Shared informers: list + watch into an indexed cache with change callbacks.
//!
//! An informer lists its kind, then applies watch events to the cache and
//! fans them out to the registered handlers. Handlers run inline on the
//! informer task and must only enqueue. Every `resync` period each cached
//! object is re-delivered as an update.
use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use gargantua_model::{ObjectMeta, Resource};
use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    error::CoreError,
    runtime::Runnable,
    store::{ApiHandle, ListParams, StoreError, WatchEvent},
};

mod cache;
use cache::{Cache, Change};
pub use cache::Lister;

mod set;
pub use set::InformerSet;

/// Default resync period.
pub const DEFAULT_RESYNC: Duration = Duration::from_secs(30 * 60);

/// Change delivered to informer handlers.
#[derive(Debug)]
pub enum Notification<'a, K> {
    Added(&'a K),
    /// Also delivered on resync, with `old` and `new` pointing at the same state.
    Updated { old: &'a K, new: &'a K },
    Deleted(&'a K),
}

impl<'a, K> Notification<'a, K> {
    /// Current state of the object (the final state for deletions).
    pub fn object(&self) -> &'a K {
        match self {
            Notification::Added(o) | Notification::Deleted(o) => o,
            Notification::Updated { new, .. } => new,
        }
    }
}

pub type Handler<K> = Arc<dyn Fn(Notification<'_, K>) + Send + Sync>;

/// Handle on an informer's `synced` flag.
#[derive(Clone)]
pub struct SyncSignal(watch::Receiver<bool>);

impl SyncSignal {
    pub fn is_synced(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the initial list has been absorbed.
    pub async fn wait(mut self) {
        let _ = self.0.wait_for(|synced| *synced).await;
    }
}

/// Wait for every signal, or give up when `cancel` fires.
///
/// Returns `true` if all caches synced.
pub async fn wait_for_sync(signals: Vec<SyncSignal>, cancel: &CancellationToken) -> bool {
    let all = async {
        for s in signals {
            s.wait().await;
        }
    };
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = all => true,
    }
}

pub struct Informer<K: Resource> {
    api: ApiHandle<K>,
    params: ListParams,
    cache: Arc<Cache<K>>,
    handlers: RwLock<Vec<Handler<K>>>,
    resync: Duration,
}

impl<K: Resource> Informer<K> {
    pub fn new(api: ApiHandle<K>, params: ListParams) -> Arc<Self> {
        Self::with_resync(api, params, DEFAULT_RESYNC)
    }

    pub fn with_resync(api: ApiHandle<K>, params: ListParams, resync: Duration) -> Arc<Self> {
        Arc::new(Self {
            api,
            params,
            cache: Arc::new(Cache::new()),
            handlers: RwLock::new(Vec::new()),
            resync,
        })
    }

    pub fn lister(&self) -> Lister<K> {
        Lister::new(self.cache.clone())
    }

    pub fn sync_signal(&self) -> SyncSignal {
        SyncSignal(self.cache.synced())
    }

    /// Register a handler. Objects already cached are replayed as additions.
    pub fn add_handler(&self, handler: Handler<K>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler.clone());
        for obj in self.cache.snapshot() {
            handler(Notification::Added(&obj));
        }
    }

    fn handlers(&self) -> Vec<Handler<K>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn dispatch(&self, n: Notification<'_, K>) {
        let handlers = self.handlers();
        match n {
            Notification::Added(o) => handlers.iter().for_each(|h| h(Notification::Added(o))),
            Notification::Updated { old, new } => handlers
                .iter()
                .for_each(|h| h(Notification::Updated { old, new })),
            Notification::Deleted(o) => handlers.iter().for_each(|h| h(Notification::Deleted(o))),
        }
    }

    fn absorb_list(&self, items: Vec<K>, rv: u64) {
        let changes = self.cache.replace(items);
        debug!(kind = K::KIND, changes = changes.len(), rv, "cache replaced from list");
        for change in changes {
            match change {
                Change::Added(o) => self.dispatch(Notification::Added(&o)),
                Change::Updated(old, new) => self.dispatch(Notification::Updated {
                    old: &old,
                    new: &new,
                }),
                Change::Deleted(o) => self.dispatch(Notification::Deleted(&o)),
            }
        }
        self.cache.observe(rv);
        self.cache.mark_synced();
    }

    fn apply(&self, ev: WatchEvent<K>) {
        let rv = ev.resource_version();
        match ev {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) => {
                let key = obj.key();
                let cached = self.cache.get(&key);
                if cached
                    .as_ref()
                    .is_some_and(|c| c.meta().resource_version >= rv)
                {
                    trace!(kind = K::KIND, key = %key, rv, "stale event skipped");
                } else if self.params.matches(&obj) {
                    match self.cache.upsert(obj) {
                        (Some(old), new) => self.dispatch(Notification::Updated {
                            old: &old,
                            new: &new,
                        }),
                        (None, new) => self.dispatch(Notification::Added(&new)),
                    }
                } else if let Some(old) = self.cache.remove(&key) {
                    // Object left the selector.
                    self.dispatch(Notification::Deleted(&old));
                }
            }
            WatchEvent::Deleted(obj) => {
                let key = obj.key();
                let newer_than_cache = self
                    .cache
                    .get(&key)
                    .is_some_and(|c| c.meta().resource_version < rv);
                if newer_than_cache && self.cache.remove(&key).is_some() {
                    self.dispatch(Notification::Deleted(&obj));
                }
            }
        }
        self.cache.observe(rv);
    }

    fn resync(&self) {
        let snapshot = self.cache.snapshot();
        trace!(kind = K::KIND, objects = snapshot.len(), "resync");
        for obj in snapshot {
            self.dispatch(Notification::Updated {
                old: &obj,
                new: &obj,
            });
        }
    }

    /// Run until `cancel` fires. Relists when the watch expires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), CoreError> {
        let mut resync = tokio::time::interval_at(Instant::now() + self.resync, self.resync);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'relist: loop {
            // Watch everything so that every version bump is observed, then
            // filter locally.
            let mut watch = self.api.watch(&ListParams::default()).await?;
            let list = self.api.list(&self.params).await?;
            self.absorb_list(list.items, list.resource_version);
            info!(kind = K::KIND, objects = self.cache.len(), "informer synced");

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(kind = K::KIND, "informer stopped");
                        return Ok(());
                    }
                    ev = watch.recv() => match ev {
                        Ok(ev) => self.apply(ev),
                        Err(StoreError::Gone { .. }) => {
                            warn!(kind = K::KIND, "watch expired, relisting");
                            continue 'relist;
                        }
                        Err(e) => return Err(e.into()),
                    },
                    _ = resync.tick() => self.resync(),
                }
            }
        }
    }
}

#[async_trait]
impl<K: Resource> Runnable for Informer<K> {
    fn name(&self) -> String {
        format!("informer/{}", K::PLURAL)
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), CoreError> {
        Informer::run(&self, cancel).await
    }
}

/// Change to an object of any kind, reduced to its metadata.
pub type MetaHandler = Arc<dyn Fn(&'static str, Notification<'_, ObjectMeta>) + Send + Sync>;

/// Kind-erased view of an informer.
///
/// Consumers that only care about labels and timestamps (cost accounting)
/// can watch a list of kinds chosen at runtime.
pub trait MetaInformer: Send + Sync {
    fn kind(&self) -> &'static str;
    fn plural(&self) -> &'static str;
    fn get_meta(&self, namespace: &str, name: &str) -> Option<ObjectMeta>;
    fn add_meta_handler(&self, handler: MetaHandler);
}

impl<K: Resource> MetaInformer for Informer<K> {
    fn kind(&self) -> &'static str {
        K::KIND
    }

    fn plural(&self) -> &'static str {
        K::PLURAL
    }

    fn get_meta(&self, namespace: &str, name: &str) -> Option<ObjectMeta> {
        self.lister().get(namespace, name).map(|o| o.meta().clone())
    }

    fn add_meta_handler(&self, handler: MetaHandler) {
        self.add_handler(Arc::new(move |n: Notification<'_, K>| match n {
            Notification::Added(o) => handler(K::KIND, Notification::Added(o.meta())),
            Notification::Updated { old, new } => handler(
                K::KIND,
                Notification::Updated {
                    old: old.meta(),
                    new: new.meta(),
                },
            ),
            Notification::Deleted(o) => handler(K::KIND, Notification::Deleted(o.meta())),
        }));
    }
}
