//! Core application configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default timings applied to every action unless its query overrides them.
///
/// Groups the parameters that control how long commands wait for the backend
/// to converge and how long long-polling reads may block.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ActionDefaults {
    /// Upper bound for convergence waits after a state-changing command (ms).
    pub execution_timeout_ms: u64,

    /// Spacing between predicate evaluations while waiting (ms).
    pub poll_interval_ms: u64,

    /// Settling delay applied after every executed action (ms).
    pub post_execution_wait_ms: u64,

    /// Upper bound for long-polling reads when the request omits `timeout` (ms).
    pub long_poll_timeout_ms: u64,
}

impl ActionDefaults {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be >= 1".to_string());
        }
        Ok(())
    }

    /// Returns the poll interval as a `Duration`.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ActionDefaults {
    fn default() -> Self {
        Self {
            execution_timeout_ms: 5000,
            poll_interval_ms: 25,
            post_execution_wait_ms: 0,
            long_poll_timeout_ms: 5000,
        }
    }
}

/// Configuration for the Zonecast core.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Preferred port for the HTTP server (0 = auto-allocate).
    pub preferred_port: u16,

    /// Timing defaults for action execution.
    #[serde(default)]
    pub actions: ActionDefaults,
}
