use gargantua_model::Resource;
use tokio::sync::broadcast;

use super::{ListParams, StoreError, StoreResult};

/// Change notification delivered by a watch.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    Added(K),
    Modified(K),
    /// Final state of the object; its resource version is the deletion version.
    Deleted(K),
}

impl<K: Resource> WatchEvent<K> {
    pub fn object(&self) -> &K {
        match self {
            WatchEvent::Added(o) | WatchEvent::Modified(o) | WatchEvent::Deleted(o) => o,
        }
    }

    pub fn resource_version(&self) -> u64 {
        self.object().meta().resource_version
    }
}

/// Receiving end of a watch, filtered by the params it was opened with.
pub struct WatchStream<K> {
    rx: broadcast::Receiver<WatchEvent<K>>,
    params: ListParams,
}

impl<K: Resource> WatchStream<K> {
    pub(crate) fn new(rx: broadcast::Receiver<WatchEvent<K>>, params: ListParams) -> Self {
        Self { rx, params }
    }

    /// Next matching event.
    ///
    /// Returns [`StoreError::Gone`] when events were dropped because the
    /// receiver lagged, and [`StoreError::Unavailable`] when the store closed.
    pub async fn recv(&mut self) -> StoreResult<WatchEvent<K>> {
        loop {
            match self.rx.recv().await {
                Ok(ev) if self.params.matches(ev.object()) => return Ok(ev),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    return Err(StoreError::Gone { kind: K::KIND });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(StoreError::Unavailable(format!(
                        "{} watch closed",
                        K::KIND
                    )));
                }
            }
        }
    }
}
