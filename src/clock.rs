//! Injectable time source, so the scheduled work queue and backoff timers
//! can be driven deterministically in tests instead of sleeping for real.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jiff::Timestamp;

/// A source of time and timers. `SystemClock` is used in production;
/// `FakeClock` lets tests advance time explicitly.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Timestamp;

    /// Sleep for `d`. Returns a future the caller awaits.
    fn sleep(&self, d: Duration) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }

    fn sleep(&self, d: Duration) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(d))
    }
}

#[derive(Debug, Default)]
struct FakeClockInner {
    now: Timestamp,
    waiters: Vec<(Timestamp, tokio::sync::oneshot::Sender<()>)>,
}

/// A manually-advanced clock for tests. `advance()` fires any sleepers
/// whose deadline has passed.
#[derive(Debug, Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeClockInner>>,
}

impl FakeClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeClockInner {
                now: start,
                waiters: Vec::new(),
            })),
        }
    }

    pub fn advance(&self, d: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.now = inner.now.checked_add(d).expect("fake clock overflow");
        let now = inner.now;
        let mut remaining = Vec::new();
        for (deadline, tx) in inner.waiters.drain(..) {
            if deadline <= now {
                let _ = tx.send(());
            } else {
                remaining.push((deadline, tx));
            }
        }
        inner.waiters = remaining;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(Timestamp::now())
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Timestamp {
        self.inner.lock().unwrap().now
    }

    fn sleep(&self, d: Duration) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        let deadline = self
            .now()
            .checked_add(d)
            .expect("fake clock overflow");
        let (tx, rx) = tokio::sync::oneshot::channel();
        {
            let mut inner = self.inner.lock().unwrap();
            if deadline <= inner.now {
                let _ = tx.send(());
            } else {
                inner.waiters.push((deadline, tx));
            }
        }
        Box::pin(async move {
            let _ = rx.await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_clock_fires_on_advance() {
        let clock = FakeClock::new(Timestamp::now());
        let sleep = clock.sleep(Duration::from_secs(5));
        let clock2 = clock.clone();
        let handle = tokio::spawn(async move {
            sleep.await;
        });
        tokio::task::yield_now().await;
        clock2.advance(Duration::from_secs(5));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn fake_clock_does_not_fire_early() {
        let clock = FakeClock::new(Timestamp::now());
        let sleep = clock.sleep(Duration::from_secs(10));
        clock.advance(Duration::from_secs(3));
        let result = tokio::time::timeout(Duration::from_millis(50), sleep).await;
        assert!(result.is_err(), "sleep should not have fired yet");
    }
}
