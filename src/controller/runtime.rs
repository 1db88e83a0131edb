//! Controller runtime (C3): a fixed worker pool draining a
//! `RateLimitedQueue<String>`, generalized from
//! `scheduler/renewal_scheduler.rs`'s `Arc<Self>` worker-spawn loop into a
//! queue-pull model instead of a priority-heap pop, since the controller has
//! no notion of renewal priority, only "needs reconciling".
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::metrics::SharedMetrics;
use crate::queue::RateLimitedQueue;

/// One reconcile step for a single work-queue key. Named after the `Sync`
/// method cert-manager's controllers expose, not the `std::marker::Sync`
/// auto trait — every bound below spells the auto trait out as
/// `std::marker::Sync` to keep the two apart.
#[async_trait]
pub trait Sync: Send + std::marker::Sync {
    async fn sync(&self, key: &str) -> crate::error::Result<()>;
}

/// Lists every key a full resync should re-enqueue, independent of any
/// single item's state. Catches missed watch events and external drift the
/// same way a periodic relist does.
pub trait KeyLister: Send + std::marker::Sync {
    fn list_keys(&self) -> Vec<String>;
}

/// Gates worker startup on leadership. `config::ControllerSettings::leader_election_enabled`
/// is a toggle rather than a real lease, since there is no cluster API
/// client in scope to hold one against; `AlwaysLeader` never blocks.
#[async_trait]
pub trait LeaderGate: Send + std::marker::Sync {
    async fn wait_until_leader(&self, shutdown: &CancellationToken);
}

#[derive(Default)]
pub struct AlwaysLeader;

#[async_trait]
impl LeaderGate for AlwaysLeader {
    async fn wait_until_leader(&self, _shutdown: &CancellationToken) {}
}

/// Fixed-size worker pool draining one `RateLimitedQueue<String>` and
/// dispatching each popped key to a `Sync` implementor.
pub struct ControllerRuntime {
    name: String,
    queue: Arc<RateLimitedQueue<String>>,
    syncer: Arc<dyn Sync>,
    workers: usize,
    metrics: SharedMetrics,
    leader_gate: Arc<dyn LeaderGate>,
}

impl ControllerRuntime {
    pub fn new(
        name: impl Into<String>,
        queue: Arc<RateLimitedQueue<String>>,
        syncer: Arc<dyn Sync>,
        workers: usize,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            syncer,
            workers: workers.max(1),
            metrics,
            leader_gate: Arc::new(AlwaysLeader),
        }
    }

    pub fn with_leader_gate(mut self, leader_gate: Arc<dyn LeaderGate>) -> Self {
        self.leader_gate = leader_gate;
        self
    }

    pub fn queue(&self) -> &Arc<RateLimitedQueue<String>> {
        &self.queue
    }

    /// Spawn `workers` tasks, each waiting for leadership then draining the
    /// queue until `shutdown` fires or the queue itself is shut down.
    pub fn spawn(self: &Arc<Self>, shutdown: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.workers)
            .map(|id| {
                let runtime = Arc::clone(self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { runtime.worker_loop(id, shutdown).await })
            })
            .collect()
    }

    /// Spawn a periodic full resync: every `period`, re-enqueues every key
    /// `lister` returns. Runs independent of leadership since it only
    /// touches the local queue, not any external system.
    pub fn spawn_resync(
        self: &Arc<Self>,
        lister: Arc<dyn KeyLister>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let runtime = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = interval.tick() => {
                        for key in lister.list_keys() {
                            runtime.queue.add(key).await;
                        }
                    }
                }
            }
        })
    }

    async fn worker_loop(self: Arc<Self>, id: usize, shutdown: CancellationToken) {
        self.leader_gate.wait_until_leader(&shutdown).await;
        loop {
            let key = tokio::select! {
                _ = shutdown.cancelled() => return,
                key = self.queue.get() => key,
            };
            let Some(key) = key else {
                return;
            };

            self.metrics
                .controller_queue_depth
                .set(self.queue.len().await as i64);
            tracing::debug!(controller = %self.name, worker = id, %key, "reconciling");

            match self.syncer.sync(&key).await {
                Ok(()) => {
                    self.metrics.controller_reconcile_total.inc();
                    self.queue.forget(&key).await;
                }
                Err(err) => {
                    self.metrics.controller_reconcile_errors_total.inc();
                    if err.is_retriable() {
                        tracing::warn!(controller = %self.name, %key, error = %err, "reconcile failed, requeueing");
                        self.queue.add_rate_limited(key.clone()).await;
                    } else {
                        tracing::error!(controller = %self.name, %key, error = %err, "reconcile failed permanently");
                        self.queue.forget(&key).await;
                    }
                }
            }
            self.queue.done(&key).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::error::{AcmeError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSyncer {
        calls: AtomicUsize,
        fail_until: usize,
    }

    #[async_trait]
    impl Sync for CountingSyncer {
        async fn sync(&self, _key: &str) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_until {
                return Err(AcmeError::timeout("not ready yet"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn processes_a_queued_key_and_forgets_it_on_success() {
        let clock: Arc<dyn crate::clock::Clock> = Arc::new(FakeClock::default());
        let queue = RateLimitedQueue::new(clock);
        queue.add("default/web".to_string()).await;

        let syncer = Arc::new(CountingSyncer {
            calls: AtomicUsize::new(0),
            fail_until: 0,
        });
        let runtime = Arc::new(ControllerRuntime::new(
            "certificates",
            queue.clone(),
            syncer.clone(),
            1,
            Arc::new(crate::metrics::MetricsRegistry::new()),
        ));

        let shutdown = CancellationToken::new();
        let handles = runtime.spawn(shutdown.clone());

        for _ in 0..50 {
            if syncer.calls.load(Ordering::SeqCst) >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(syncer.calls.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        queue.shutdown().await;
        for h in handles {
            let _ = h.await;
        }
    }

    struct ListTwoKeys;

    impl KeyLister for ListTwoKeys {
        fn list_keys(&self) -> Vec<String> {
            vec!["default/a".to_string(), "default/b".to_string()]
        }
    }

    #[tokio::test]
    async fn resync_enqueues_every_listed_key() {
        let clock: Arc<dyn crate::clock::Clock> = Arc::new(FakeClock::default());
        let queue = RateLimitedQueue::new(clock);
        let syncer = Arc::new(CountingSyncer {
            calls: AtomicUsize::new(0),
            fail_until: 0,
        });
        let runtime = Arc::new(ControllerRuntime::new(
            "certificates",
            queue.clone(),
            syncer,
            1,
            Arc::new(crate::metrics::MetricsRegistry::new()),
        ));

        let shutdown = CancellationToken::new();
        let handle = runtime.spawn_resync(Arc::new(ListTwoKeys), Duration::from_millis(5), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(queue.len().await, 2);

        shutdown.cancel();
        let _ = handle.await;
    }
}
