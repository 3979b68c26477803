//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use zonecast_core::{ActionDefaults, FleetSpec};

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to (0 = first free port of the fallback range).
    /// Override: `ZONECAST_BIND_PORT`
    pub bind_port: u16,

    /// Spacing between convergence/long-poll checks in milliseconds.
    /// Override: `ZONECAST_POLL_INTERVAL_MS`
    pub poll_interval_ms: u64,

    /// Upper bound for convergence waits after a command in milliseconds.
    /// Override: `ZONECAST_EXECUTION_TIMEOUT_MS`
    pub execution_timeout_ms: u64,

    /// Settling delay applied after every executed action in milliseconds.
    pub post_execution_wait_ms: u64,

    /// Long-poll timeout when the request omits `timeout`, in milliseconds.
    pub long_poll_timeout_ms: u64,

    /// Delay before the virtual fleet applies an accepted command.
    /// Override: `ZONECAST_SETTLE_DELAY_MS`
    pub settle_delay_ms: u64,

    /// Fleet description (YAML). The demo fleet is used when unset.
    pub fleet: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let actions = ActionDefaults::default();
        Self {
            bind_port: 8180,
            poll_interval_ms: actions.poll_interval_ms,
            execution_timeout_ms: actions.execution_timeout_ms,
            post_execution_wait_ms: actions.post_execution_wait_ms,
            long_poll_timeout_ms: actions.long_poll_timeout_ms,
            settle_delay_ms: 150,
            fleet: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("ZONECAST_BIND_PORT").and_then(|v| v.parse().ok()) {
            self.bind_port = port;
        }

        if let Some(ms) = lookup("ZONECAST_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.poll_interval_ms = ms;
        }

        if let Some(ms) = lookup("ZONECAST_EXECUTION_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.execution_timeout_ms = ms;
        }

        if let Some(ms) = lookup("ZONECAST_SETTLE_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.settle_delay_ms = ms;
        }

        // Note: ZONECAST_FLEET is handled by clap via #[arg(env = ...)] in main.rs
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Converts to zonecast-core's Config type.
    pub fn to_core_config(&self) -> zonecast_core::Config {
        zonecast_core::Config {
            preferred_port: self.bind_port,
            actions: ActionDefaults {
                execution_timeout_ms: self.execution_timeout_ms,
                poll_interval_ms: self.poll_interval_ms,
                post_execution_wait_ms: self.post_execution_wait_ms,
                long_poll_timeout_ms: self.long_poll_timeout_ms,
            },
        }
    }

    /// Reads the configured fleet description, or returns the demo fleet.
    pub fn load_fleet(&self) -> Result<FleetSpec> {
        let Some(path) = self.fleet.as_deref() else {
            return Ok(FleetSpec::demo());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fleet file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse fleet file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn yaml_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_port: 9000\npoll_interval_ms: 50").unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.bind_port, 9000);
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.execution_timeout_ms, 5000);
    }

    #[test]
    fn env_overrides_apply_to_timings() {
        let mut config = ServerConfig::default();
        config.apply_overrides(|key| match key {
            "ZONECAST_BIND_PORT" => Some("9100".into()),
            "ZONECAST_SETTLE_DELAY_MS" => Some("0".into()),
            "ZONECAST_POLL_INTERVAL_MS" => Some("not-a-number".into()),
            _ => None,
        });

        assert_eq!(config.bind_port, 9100);
        assert_eq!(config.settle_delay(), Duration::ZERO);
        assert_eq!(config.poll_interval_ms, 25);
    }

    #[test]
    fn core_config_carries_action_defaults() {
        let config = ServerConfig {
            execution_timeout_ms: 800,
            ..ServerConfig::default()
        };
        let core = config.to_core_config();
        assert_eq!(core.preferred_port, 8180);
        assert_eq!(core.actions.execution_timeout_ms, 800);
    }

    #[test]
    fn fleet_file_is_parsed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "rooms:\n  - name: Studio\n  - name: Hall\nzones:\n  - rooms: [Studio, Hall]"
        )
        .unwrap();

        let config = ServerConfig {
            fleet: Some(file.path().to_path_buf()),
            ..ServerConfig::default()
        };
        let fleet = config.load_fleet().unwrap();
        assert_eq!(fleet.rooms.len(), 2);
        assert_eq!(fleet.zones[0].rooms, vec!["Studio", "Hall"]);
    }

    #[test]
    fn missing_fleet_falls_back_to_demo() {
        let fleet = ServerConfig::default().load_fleet().unwrap();
        assert!(!fleet.rooms.is_empty());
    }
}
