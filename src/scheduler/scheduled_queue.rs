//! A work queue that invokes a callback once a per-key delay elapses,
//! with the ability to cancel ("forget") a pending entry before it fires.
//!
//! Ported near-verbatim from a scheduled work queue used to drive
//! certificate renewal: adding an entry that is already scheduled first
//! cancels the old timer, and cancellation happens before the map lock is
//! taken to avoid a deadlock between `Add` and the timer's own callback.
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::clock::Clock;

/// Invoked when a scheduled key's timer fires without being cancelled.
pub trait ProcessFunc<K>: Fn(K) + Send + Sync + 'static {}
impl<K, F: Fn(K) + Send + Sync + 'static> ProcessFunc<K> for F {}

struct Timer {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Schedules `process` to run for a key after a delay, with cancellation.
pub struct ScheduledWorkQueue<K, F> {
    process: Arc<F>,
    work: Arc<Mutex<HashMap<K, Timer>>>,
    clock: Arc<dyn Clock>,
}

impl<K, F> ScheduledWorkQueue<K, F>
where
    K: Eq + Hash + Clone + Send + 'static,
    F: ProcessFunc<K>,
{
    pub fn new(clock: Arc<dyn Clock>, process: F) -> Arc<Self> {
        Arc::new(Self {
            process: Arc::new(process),
            work: Arc::new(Mutex::new(HashMap::new())),
            clock,
        })
    }

    /// Schedule `key` to be processed after `duration`. If `key` already
    /// has a pending timer, that timer is cancelled first.
    pub fn add(&self, key: K, duration: Duration) {
        // Forget before acquiring the lock: the previous timer's own
        // completion path also takes this lock in its cleanup, so
        // cancelling first avoids a self-deadlock if `add` races with a
        // timer that is just about to fire.
        self.forget(&key);

        let (tx, rx) = oneshot::channel();
        let process = self.process.clone();
        let work = self.work.clone();
        let sleep = self.clock.sleep(duration);
        let key_for_task = key.clone();
        let key_for_cleanup = key.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = sleep => {
                    process(key_for_task);
                }
                _ = rx => {
                    // cancelled, do not invoke process
                }
            }
            work.lock().unwrap().remove(&key_for_cleanup);
        });

        self.work
            .lock()
            .unwrap()
            .insert(key, Timer { cancel: tx, handle });
    }

    /// Cancel a pending entry for `key`, if any. No-op if not scheduled.
    pub fn forget(&self, key: &K) {
        if let Some(timer) = self.work.lock().unwrap().remove(key) {
            let _ = timer.cancel.send(());
            timer.handle.abort();
        }
    }

    pub fn len(&self) -> usize {
        self.work.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Object-safe view of a [`ScheduledWorkQueue`], so reconciler structs can
/// hold `Arc<dyn Scheduler<String>>` without leaking the queue's callback
/// type parameter `F` into their own signatures.
pub trait Scheduler<K>: Send + Sync {
    fn schedule(&self, key: K, after: Duration);
    fn cancel(&self, key: &K);
}

impl<K, F> Scheduler<K> for ScheduledWorkQueue<K, F>
where
    K: Eq + Hash + Clone + Send + 'static,
    F: ProcessFunc<K>,
{
    fn schedule(&self, key: K, after: Duration) {
        self.add(key, after);
    }

    fn cancel(&self, key: &K) {
        self.forget(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn fires_after_duration() {
        let clock = Arc::new(FakeClock::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let q = ScheduledWorkQueue::new(clock.clone(), move |_key: String| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });

        q.add("cert/a".to_string(), Duration::from_secs(30));
        assert_eq!(q.len(), 1);

        clock.advance(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(q.len(), 0);
    }

    #[tokio::test]
    async fn forget_prevents_fire() {
        let clock = Arc::new(FakeClock::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let q = ScheduledWorkQueue::new(clock.clone(), move |_key: String| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });

        q.add("cert/a".to_string(), Duration::from_secs(30));
        q.forget(&"cert/a".to_string());

        clock.advance(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn re_add_replaces_prior_timer() {
        let clock = Arc::new(FakeClock::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let q = ScheduledWorkQueue::new(clock.clone(), move |_key: String| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });

        q.add("cert/a".to_string(), Duration::from_secs(10));
        q.add("cert/a".to_string(), Duration::from_secs(30));

        clock.advance(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0, "original timer should have been cancelled");

        clock.advance(Duration::from_secs(20));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
