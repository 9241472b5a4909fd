//! Bounded polling for a condition owned by another component.

use std::time::Duration;

use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::errors::{BridgeError, BridgeResult};

/// Poll `condition` every `every` until it holds, or fail after `limit`.
///
/// `what` names the condition in the timeout error.
pub async fn wait_for_condition(
    condition: impl Fn() -> bool,
    every: Duration,
    limit: Duration,
    what: &'static str,
) -> BridgeResult<()> {
    let poll = async {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if condition() {
                return;
            }
        }
    };
    timeout(limit, poll).await.map_err(|_| BridgeError::Timeout(what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_returns_once_condition_holds() {
        let polls = AtomicUsize::new(0);

        let result = wait_for_condition(
            || polls.fetch_add(1, Ordering::SeqCst) >= 2,
            Duration::from_millis(500),
            Duration::from_secs(30),
            "test",
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let result = wait_for_condition(|| false, Duration::from_millis(500), Duration::from_secs(2), "bridge").await;
        assert!(matches!(result, Err(BridgeError::Timeout("bridge"))));
    }
}
