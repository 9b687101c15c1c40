use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{ExponentialLimiter, WorkQueue};

/// Work queue with delayed and rate-limited re-enqueue.
///
/// Delayed keys wait on their own timer task; a key already waiting with an
/// earlier deadline is not scheduled again. Shutdown drops pending timers.
pub struct RateLimitingQueue {
    queue: Arc<WorkQueue>,
    limiter: Mutex<ExponentialLimiter>,
    waiting: Arc<Mutex<HashMap<String, Instant>>>,
    timers: CancellationToken,
}

impl Default for RateLimitingQueue {
    fn default() -> Self {
        Self::new(ExponentialLimiter::default())
    }
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RateLimitingQueue {
    pub fn new(limiter: ExponentialLimiter) -> Self {
        Self {
            queue: Arc::new(WorkQueue::new()),
            limiter: Mutex::new(limiter),
            waiting: Arc::new(Mutex::new(HashMap::new())),
            timers: CancellationToken::new(),
        }
    }

    pub fn add(&self, key: impl Into<String>) {
        self.queue.add(key);
    }

    /// Enqueue `key` once `delay` has elapsed.
    pub fn add_after(&self, key: impl Into<String>, delay: Duration) {
        let key = key.into();
        if delay.is_zero() {
            self.queue.add(key);
            return;
        }
        if self.queue.is_shutting_down() {
            return;
        }

        let deadline = Instant::now() + delay;
        {
            let mut waiting = locked(&self.waiting);
            if waiting.get(&key).is_some_and(|at| *at <= deadline) {
                return;
            }
            waiting.insert(key.clone(), deadline);
        }

        let queue = self.queue.clone();
        let waiting = self.waiting.clone();
        let cancel = self.timers.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    let fire = {
                        let mut waiting = locked(&waiting);
                        if waiting.get(&key) == Some(&deadline) {
                            waiting.remove(&key);
                            true
                        } else {
                            false
                        }
                    };
                    if fire {
                        queue.add(key);
                    }
                }
            }
        });
    }

    /// Enqueue `key` after its backoff delay.
    pub fn add_rate_limited(&self, key: impl Into<String>) -> Duration {
        let key = key.into();
        let delay = locked(&self.limiter).when(&key);
        self.add_after(key, delay);
        delay
    }

    /// Reset the backoff of `key`.
    pub fn forget(&self, key: &str) {
        locked(&self.limiter).forget(key);
    }

    pub fn retries(&self, key: &str) -> u32 {
        locked(&self.limiter).retries(key)
    }

    pub async fn get(&self) -> Option<String> {
        self.queue.get().await
    }

    pub fn done(&self, key: &str) {
        self.queue.done(key);
    }

    pub fn shutdown(&self) {
        self.timers.cancel();
        self.queue.shutdown();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn add_after_fires_once_at_earliest_deadline() {
        let q = RateLimitingQueue::default();
        q.add_after("a", Duration::from_secs(10));
        q.add_after("a", Duration::from_secs(30));
        q.add_after("a", Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await.as_deref(), Some("a"));
        q.done("a");

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(q.is_empty(), "superseded timers do not fire");
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_delays_grow_and_reset() {
        let q = RateLimitingQueue::default();
        assert_eq!(q.add_rate_limited("a"), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(6)).await;
        let key = q.get().await.unwrap();

        assert_eq!(q.add_rate_limited(key.clone()), Duration::from_millis(10));
        assert_eq!(q.retries("a"), 2);
        q.done(&key);

        q.forget("a");
        assert_eq!(q.retries("a"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_pending_timers() {
        let q = RateLimitingQueue::default();
        q.add("now");
        q.add_after("later", Duration::from_secs(1));
        q.shutdown();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(q.get().await.as_deref(), Some("now"));
        assert_eq!(q.get().await, None);
    }
}
