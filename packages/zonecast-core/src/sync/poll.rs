//! Bounded-retry polling.
//!
//! Bridges the eventually consistent backend and the request/response cycle:
//! the predicate is re-evaluated at a fixed spacing until it holds or the
//! deadline passes. The predicate is a plain closure, so any backend lock it
//! takes is released before the next sleep.

use std::time::Duration;

use tokio::time::Instant;

/// Shortest spacing between evaluations; guards against a zero interval spinning.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Result of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Whether the predicate held before the deadline.
    pub satisfied: bool,
    /// Time spent waiting.
    pub elapsed: Duration,
    /// Number of predicate evaluations.
    pub attempts: u32,
}

/// Evaluates `predicate` every `interval` until it returns true or `timeout`
/// elapses.
///
/// The predicate is always evaluated at least once, even with a zero timeout.
/// The final sleep is clipped to the remaining time, so a predicate that never
/// holds is evaluated `ceil(timeout / interval)` times.
pub async fn poll_until<P>(mut predicate: P, interval: Duration, timeout: Duration) -> PollOutcome
where
    P: FnMut() -> bool,
{
    let interval = interval.max(MIN_INTERVAL);
    let started = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;
        if predicate() {
            return PollOutcome {
                satisfied: true,
                elapsed: started.elapsed(),
                attempts,
            };
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            break;
        }
        tokio::time::sleep(interval.min(timeout - elapsed)).await;
        if started.elapsed() >= timeout {
            break;
        }
    }

    PollOutcome {
        satisfied: false,
        elapsed: started.elapsed(),
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn never_true_predicate_is_bounded() {
        let calls = AtomicU32::new(0);
        let outcome = poll_until(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                false
            },
            Duration::from_millis(25),
            Duration::from_millis(200),
        )
        .await;

        assert!(!outcome.satisfied);
        assert_eq!(outcome.attempts, 8);
        assert_eq!(calls.load(Ordering::SeqCst), 8);
        assert_eq!(outcome.elapsed, Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn uneven_timeout_rounds_up() {
        let outcome =
            poll_until(|| false, Duration::from_millis(30), Duration::from_millis(100)).await;
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.elapsed, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_does_not_sleep() {
        let outcome = poll_until(|| true, Duration::from_millis(25), Duration::from_secs(5)).await;
        assert!(outcome.satisfied);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_condition_lands() {
        let flag = Arc::new(AtomicU32::new(0));
        let setter = Arc::clone(&flag);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            setter.store(1, Ordering::SeqCst);
        });

        let outcome = poll_until(
            || flag.load(Ordering::SeqCst) == 1,
            Duration::from_millis(25),
            Duration::from_secs(1),
        )
        .await;

        assert!(outcome.satisfied);
        assert_eq!(outcome.elapsed, Duration::from_millis(75));
        assert_eq!(outcome.attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_evaluates_once() {
        let outcome = poll_until(|| false, Duration::from_millis(25), Duration::ZERO).await;
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.satisfied);
    }
}
