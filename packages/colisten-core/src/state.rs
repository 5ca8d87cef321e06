//! Core configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_SESSIONS_ROOT, EVENT_CHANNEL_CAPACITY, HEARTBEAT_INTERVAL_SECS,
    INACTIVITY_TIMEOUT_SECS, PATH_SEPARATOR,
};

/// Configuration for the co-listen coordinator.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Interval between `lastActivity` heartbeat writes (seconds).
    pub heartbeat_interval_secs: u64,

    /// Host-only sessions idle for longer than this are deleted (seconds).
    pub inactivity_timeout_secs: u64,

    /// Store root under which session documents are written.
    pub sessions_root: String,

    /// Capacity of the session event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_interval_secs == 0 {
            return Err("heartbeat_interval_secs must be >= 1".to_string());
        }
        if self.inactivity_timeout_secs == 0 {
            return Err("inactivity_timeout_secs must be >= 1".to_string());
        }
        if self.sessions_root.is_empty() || self.sessions_root.contains(PATH_SEPARATOR) {
            return Err("sessions_root must be a single non-empty path segment".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        Ok(())
    }

    /// Heartbeat interval as a [`Duration`].
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Inactivity threshold in milliseconds, as compared against `lastActivity`.
    #[must_use]
    pub fn inactivity_timeout_ms(&self) -> u64 {
        self.inactivity_timeout_secs.saturating_mul(1000)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: HEARTBEAT_INTERVAL_SECS,
            inactivity_timeout_secs: INACTIVITY_TIMEOUT_SECS,
            sessions_root: DEFAULT_SESSIONS_ROOT.to_string(),
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(60));
        assert_eq!(config.inactivity_timeout_ms(), 600_000);
    }

    #[test]
    fn config_rejects_zero_values() {
        let mut config = Config {
            heartbeat_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.heartbeat_interval_secs = 60;
        config.inactivity_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.inactivity_timeout_secs = 600;
        config.event_channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_rejects_nested_root() {
        let config = Config {
            sessions_root: "a/b".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_fills_missing_fields_from_defaults() {
        let config: Config = serde_json::from_str(r#"{"heartbeat_interval_secs": 5}"#).unwrap();
        assert_eq!(config.heartbeat_interval_secs, 5);
        assert_eq!(config.inactivity_timeout_secs, 600);
        assert_eq!(config.sessions_root, "sessions");
    }
}
