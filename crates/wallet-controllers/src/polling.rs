//! Background polling tasks.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// A periodic task bound to a controller.
///
/// The task holds only a weak reference, so it ends by itself once the
/// controller is dropped. Dropping the poller aborts it.
pub struct Poller {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl Poller {
    /// Run `tick` immediately and then every `interval`.
    pub fn spawn<C, F, Fut>(name: &'static str, interval: Duration, target: &Arc<C>, tick: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(Arc<C>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let weak: Weak<C> = Arc::downgrade(target);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(target) = weak.upgrade() else {
                    debug!(poller = name, "Target dropped, poller exiting");
                    break;
                };
                tick(target).await;
            }
        });
        debug!(poller = name, interval_ms = interval.as_millis() as u64, "Poller started");
        Self { name, handle }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_poller_ticks_until_stopped() {
        let counter = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn("test", Duration::from_secs(10), &counter, |c| async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        poller.stop();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
