//! Client session bookkeeping for long-polling reads.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// Sessions without activity for this long are forgotten.
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Last activity per client-supplied `sessionId`.
///
/// Purely informational: removing a session never interrupts a poll that is
/// already waiting. Idle sessions are evicted whenever another session is
/// touched, so clients that rotate ids cannot grow the map without bound.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<String, Instant>,
    idle_timeout: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_SESSION_IDLE_TIMEOUT)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
        }
    }

    /// Records activity for a session, registering it on first sight.
    pub fn touch(&self, session_id: &str) {
        self.evict_idle();
        self.sessions.insert(session_id.to_string(), Instant::now());
    }

    /// Forgets a session. Returns whether it was known.
    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Drops every session idle for at least the idle timeout.
    /// Returns how many were dropped.
    pub fn evict_idle(&self) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, last_seen| last_seen.elapsed() < self.idle_timeout);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            log::debug!("[LongPoll] Evicted {} idle session(s)", evicted);
        }
        evicted
    }

    #[must_use]
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_then_remove() {
        let sessions = SessionRegistry::new();
        sessions.touch("abc");
        sessions.touch("abc");
        assert_eq!(sessions.len(), 1);
        assert!(sessions.contains("abc"));

        assert!(sessions.remove("abc"));
        assert!(!sessions.remove("abc"));
        assert!(sessions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_evicted_on_touch() {
        let sessions = SessionRegistry::with_idle_timeout(Duration::from_secs(60));
        sessions.touch("old");
        sessions.touch("active");

        tokio::time::advance(Duration::from_secs(45)).await;
        sessions.touch("active");

        tokio::time::advance(Duration::from_secs(30)).await;
        sessions.touch("new");

        assert!(!sessions.contains("old"));
        assert!(sessions.contains("active"));
        assert!(sessions.contains("new"));
        assert_eq!(sessions.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rotating_ids_stay_bounded() {
        let sessions = SessionRegistry::with_idle_timeout(Duration::from_secs(10));
        for i in 0..100 {
            sessions.touch(&format!("tab-{}", i));
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert!(sessions.len() <= 10);
        assert!(sessions.contains("tab-99"));
        assert!(!sessions.contains("tab-0"));
    }
}
