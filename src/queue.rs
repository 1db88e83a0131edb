//! A rate-limited work queue: the controller runtime's workers pull keys
//! from here. Adding a key that is already queued or already being
//! processed is deduplicated; `add_rate_limited` backs a key off with
//! exponential delay instead of requeueing it immediately.
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::clock::Clock;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30 * 60);

struct Inner<K: Eq + Hash + Clone> {
    queue: VecDeque<K>,
    queued: HashSet<K>,
    processing: HashSet<K>,
    /// keys marked dirty while they were already processing; re-added once `done` runs
    dirty_while_processing: HashSet<K>,
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

/// A FIFO work queue with per-key dedup and exponential-backoff requeue,
/// generalized from a priority-heap renewal scheduler into a plain FIFO
/// queue driven by the controller runtime rather than a priority field.
pub struct RateLimitedQueue<K: Eq + Hash + Clone + Send + 'static> {
    inner: Mutex<Inner<K>>,
    notify: Notify,
    clock: Arc<dyn Clock>,
    base_delay: Duration,
    max_delay: Duration,
}

impl<K: Eq + Hash + Clone + Send + 'static> RateLimitedQueue<K> {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Self::with_backoff(clock, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }

    pub fn with_backoff(clock: Arc<dyn Clock>, base_delay: Duration, max_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                queued: HashSet::new(),
                processing: HashSet::new(),
                dirty_while_processing: HashSet::new(),
                failures: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            clock,
            base_delay,
            max_delay,
        })
    }

    /// Enqueue `key` immediately. No-op if already queued; if the key is
    /// currently being processed, it is marked dirty so it is re-enqueued
    /// once the in-flight run calls `done`.
    pub async fn add(&self, key: K) {
        let mut inner = self.inner.lock().await;
        if inner.shutting_down {
            return;
        }
        if inner.processing.contains(&key) {
            inner.dirty_while_processing.insert(key);
            return;
        }
        if inner.queued.insert(key.clone()) {
            inner.queue.push_back(key);
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Enqueue `key` after `delay`, without touching the failure counter.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        let this = self.clone();
        let sleep = self.clock.sleep(delay);
        tokio::spawn(async move {
            sleep.await;
            this.add(key).await;
        });
    }

    /// Enqueue `key` after an exponentially growing delay based on how
    /// many times it has failed (`base_delay * 2^failures`, capped at
    /// `max_delay`), and bump the failure counter.
    pub async fn add_rate_limited(self: &Arc<Self>, key: K) {
        let delay = {
            let mut inner = self.inner.lock().await;
            let failures = inner.failures.entry(key.clone()).or_insert(0);
            let exp = (*failures).min(32);
            *failures += 1;
            let factor = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
            let millis = self
                .base_delay
                .as_millis()
                .saturating_mul(factor as u128)
                .min(self.max_delay.as_millis());
            Duration::from_millis(millis as u64)
        };
        self.add_after(key, delay);
    }

    /// Clear the failure counter for `key`, called after a successful sync.
    pub async fn forget(&self, key: &K) {
        self.inner.lock().await.failures.remove(key);
    }

    pub async fn num_requeues(&self, key: &K) -> u32 {
        self.inner.lock().await.failures.get(key).copied().unwrap_or(0)
    }

    /// Pop the next key to process, blocking until one is available or the
    /// queue is shut down (in which case `None` is returned).
    pub async fn get(self: &Arc<Self>) -> Option<K> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(key) = inner.queue.pop_front() {
                    inner.queued.remove(&key);
                    inner.processing.insert(key.clone());
                    return Some(key);
                }
                if inner.shutting_down {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Mark `key` as finished processing. If it was marked dirty while it
    /// ran, it is re-enqueued now.
    pub async fn done(&self, key: &K) {
        let mut inner = self.inner.lock().await;
        inner.processing.remove(key);
        if inner.dirty_while_processing.remove(key) && inner.queued.insert(key.clone()) {
            inner.queue.push_back(key.clone());
            drop(inner);
            self.notify.notify_one();
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.shutting_down = true;
        drop(inner);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    #[tokio::test]
    async fn dedups_queued_keys() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::default());
        let q = RateLimitedQueue::new(clock);
        q.add("a".to_string()).await;
        q.add("a".to_string()).await;
        assert_eq!(q.len().await, 1);
    }

    #[tokio::test]
    async fn dirty_while_processing_requeues_on_done() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::default());
        let q = RateLimitedQueue::new(clock);
        q.add("a".to_string()).await;
        let got = q.get().await.unwrap();
        assert_eq!(got, "a");

        // while "a" is processing, a second change comes in
        q.add("a".to_string()).await;
        assert_eq!(q.len().await, 0, "should not double-queue while processing");

        q.done(&got).await;
        assert_eq!(q.len().await, 1, "dirty key should be requeued after done");
    }

    #[tokio::test]
    async fn rate_limited_backoff_grows() {
        let clock = Arc::new(FakeClock::default());
        let q = RateLimitedQueue::<String>::with_backoff(
            clock.clone(),
            Duration::from_secs(5),
            Duration::from_secs(1800),
        );
        q.add_rate_limited("a".to_string()).await;
        assert_eq!(q.num_requeues(&"a".to_string()).await, 1);
        tokio::task::yield_now().await;

        clock.advance(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(q.len().await, 1);
    }
}
