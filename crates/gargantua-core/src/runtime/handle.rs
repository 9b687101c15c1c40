use std::{sync::Arc, time::Duration};

use tracing::trace;

use crate::{queue::RateLimitingQueue, shard::Shard};

/// Enqueue side of a controller's queue.
///
/// Applies the controller's shard filter: keys owned by another replica are
/// dropped here and never reach a worker.
#[derive(Clone)]
pub struct QueueHandle {
    queue: Arc<RateLimitingQueue>,
    shard: Shard,
}

impl QueueHandle {
    pub(crate) fn new(queue: Arc<RateLimitingQueue>, shard: Shard) -> Self {
        Self { queue, shard }
    }

    fn owns(&self, key: &str) -> bool {
        let owned = self.shard.owns(key);
        if !owned {
            trace!(key, shard = %self.shard, "key belongs to another shard");
        }
        owned
    }

    pub fn add(&self, key: impl Into<String>) {
        let key = key.into();
        if self.owns(&key) {
            self.queue.add(key);
        }
    }

    pub fn add_after(&self, key: impl Into<String>, delay: Duration) {
        let key = key.into();
        if self.owns(&key) {
            self.queue.add_after(key, delay);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
