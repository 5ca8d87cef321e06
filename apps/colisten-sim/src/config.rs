//! Simulator configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Simulator configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of guest devices joining the host.
    /// Override: `COLISTEN_GUESTS`
    pub guests: usize,

    /// Track titles the host plays in order.
    pub playlist: Vec<String>,

    /// How long each track plays once the barrier opens, in seconds.
    /// Override: `COLISTEN_PLAY_SECS`
    pub play_secs: u64,

    /// Upper bound for a device's simulated load time, in milliseconds.
    /// Override: `COLISTEN_MAX_BUFFER_MS`
    pub max_buffer_ms: u64,

    /// Interval between host position updates, in milliseconds.
    pub position_update_ms: u64,

    /// Heartbeat period handed to every coordinator.
    /// Override: `COLISTEN_HEARTBEAT_INTERVAL`
    pub heartbeat_interval_secs: u64,

    /// Idle time after which a host-only session is reaped.
    pub inactivity_timeout_secs: u64,

    /// Root node under which session documents live.
    pub sessions_root: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            guests: 2,
            playlist: vec![
                "Opening Theme".to_string(),
                "Second Movement".to_string(),
                "Closing Credits".to_string(),
            ],
            play_secs: 3,
            max_buffer_ms: 1500,
            position_update_ms: 1000,
            heartbeat_interval_secs: 60,
            inactivity_timeout_secs: 600,
            sessions_root: "sessions".to_string(),
        }
    }
}

impl SimConfig {
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
        config.check()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("COLISTEN_GUESTS") {
            if let Ok(guests) = val.parse() {
                self.guests = guests;
            }
        }

        if let Ok(val) = std::env::var("COLISTEN_PLAY_SECS") {
            if let Ok(secs) = val.parse() {
                self.play_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("COLISTEN_MAX_BUFFER_MS") {
            if let Ok(ms) = val.parse() {
                self.max_buffer_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("COLISTEN_HEARTBEAT_INTERVAL") {
            if let Ok(secs) = val.parse() {
                self.heartbeat_interval_secs = secs;
            }
        }
    }

    fn check(&self) -> Result<()> {
        if self.playlist.is_empty() {
            bail!("playlist must contain at least one track");
        }
        if self.position_update_ms == 0 {
            bail!("position_update_ms must be greater than zero");
        }
        Ok(())
    }

    /// Converts to colisten-core's Config type.
    pub fn to_core_config(&self) -> colisten_core::Config {
        colisten_core::Config {
            heartbeat_interval_secs: self.heartbeat_interval_secs,
            inactivity_timeout_secs: self.inactivity_timeout_secs,
            sessions_root: self.sessions_root.clone(),
            ..Default::default()
        }
    }
}
