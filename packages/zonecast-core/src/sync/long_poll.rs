//! Long-poll protocol.
//!
//! A client sends the last version it saw. If the resource has moved on since,
//! the read answers at once; otherwise it waits for the next change, bounded by
//! a timeout after which it answers with whatever is current.

use std::time::Duration;

use super::poll::poll_until;
use super::versions::ResourceKey;
use crate::backend::UpdateIdSource;

/// Parameters of a single long-polling read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongPollRequest {
    pub resource: ResourceKey,
    /// Version the client last saw. `None` means "no prior version".
    pub last_update_id: Option<u64>,
    pub interval: Duration,
    pub timeout: Duration,
}

/// What the wait observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongPollOutcome {
    /// Version to report back to the client.
    pub update_id: u64,
    /// True if the version differs from the client's.
    pub changed: bool,
    pub waited: Duration,
}

/// Parses a client-supplied `lastUpdateId`.
///
/// Anything that is not a plain unsigned integer is the "no prior version"
/// sentinel and always counts as changed.
pub fn parse_last_update_id(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.trim().parse::<u64>().ok())
}

/// Waits until the resource version differs from the client's, or times out.
pub async fn wait_for_change<S>(source: &S, request: &LongPollRequest) -> LongPollOutcome
where
    S: UpdateIdSource + ?Sized,
{
    let current = source.update_id(&request.resource);
    let last = match request.last_update_id {
        Some(last) if last == current => last,
        _ => {
            return LongPollOutcome {
                update_id: current,
                changed: true,
                waited: Duration::ZERO,
            };
        }
    };

    log::debug!(
        "[LongPoll] Waiting on {} past version {} (timeout {:?})",
        request.resource,
        last,
        request.timeout
    );

    let outcome = poll_until(
        || source.update_id(&request.resource) != last,
        request.interval,
        request.timeout,
    )
    .await;

    if !outcome.satisfied {
        log::debug!(
            "[LongPoll] {} unchanged after {:?}",
            request.resource,
            outcome.elapsed
        );
    }

    LongPollOutcome {
        update_id: source.update_id(&request.resource),
        changed: outcome.satisfied,
        waited: outcome.elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::UpdateIdRegistry;
    use std::sync::Arc;

    struct Counters(Arc<UpdateIdRegistry>);

    impl UpdateIdSource for Counters {
        fn update_id(&self, resource: &ResourceKey) -> u64 {
            self.0.current(resource)
        }
    }

    fn request(last: Option<u64>) -> LongPollRequest {
        LongPollRequest {
            resource: ResourceKey::ZoneConfig,
            last_update_id: last,
            interval: Duration::from_millis(25),
            timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn unparseable_update_id_is_sentinel() {
        assert_eq!(parse_last_update_id(Some("12")), Some(12));
        assert_eq!(parse_last_update_id(Some("-1")), None);
        assert_eq!(parse_last_update_id(Some("abc")), None);
        assert_eq!(parse_last_update_id(None), None);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_version_returns_immediately() {
        let registry = Arc::new(UpdateIdRegistry::new());
        registry.bump(&ResourceKey::ZoneConfig);

        let outcome = wait_for_change(&Counters(registry), &request(None)).await;
        assert!(outcome.changed);
        assert_eq!(outcome.update_id, 1);
        assert_eq!(outcome.waited, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_version_returns_immediately() {
        let registry = Arc::new(UpdateIdRegistry::new());
        registry.bump(&ResourceKey::ZoneConfig);
        registry.bump(&ResourceKey::ZoneConfig);

        let outcome = wait_for_change(&Counters(registry), &request(Some(1))).await;
        assert!(outcome.changed);
        assert_eq!(outcome.update_id, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn current_version_blocks_until_change() {
        let registry = Arc::new(UpdateIdRegistry::new());
        let writer = Arc::clone(&registry);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            writer.bump(&ResourceKey::ZoneConfig);
        });

        let outcome = wait_for_change(&Counters(registry), &request(Some(0))).await;
        assert!(outcome.changed);
        assert_eq!(outcome.update_id, 1);
        assert!(outcome.waited >= Duration::from_millis(120));
        assert!(outcome.waited < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn current_version_times_out_unchanged() {
        let registry = Arc::new(UpdateIdRegistry::new());

        let outcome = wait_for_change(&Counters(registry), &request(Some(0))).await;
        assert!(!outcome.changed);
        assert_eq!(outcome.update_id, 0);
        assert_eq!(outcome.waited, Duration::from_millis(500));
    }
}
