//! Event system for session lifecycle notifications.
//!
//! This module provides:
//! - [`EventEmitter`] trait for the coordinator to emit events
//! - [`BroadcastEventBridge`] for in-process subscribers
//! - [`SessionEvent`], the lifecycle event type

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

/// Lifecycle transitions observed by one device's coordinator.
///
/// Events describe what this device did or saw. They are local and never
/// written to the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// This device created a session and became its host.
    Created {
        code: String,
        #[serde(rename = "hostId")]
        host_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// This device joined an existing session as a guest.
    Joined {
        code: String,
        #[serde(rename = "userId")]
        user_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// This device left the session voluntarily.
    Left {
        code: String,
        #[serde(rename = "wasHost")]
        was_host: bool,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The session document disappeared or became undecodable.
    Ended {
        code: String,
        reason: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The host changed track and raised the buffering barrier.
    BarrierRaised {
        code: String,
        #[serde(rename = "songId")]
        song_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// This device observed every participant ready and cleared the barrier.
    BarrierCleared {
        code: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The host deleted its own abandoned session.
    Reaped {
        code: String,
        #[serde(rename = "idleMs")]
        idle_ms: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The store subscription reported an error.
    ListenerFailed {
        code: String,
        message: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

impl SessionEvent {
    /// Session code the event refers to.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Created { code, .. }
            | Self::Joined { code, .. }
            | Self::Left { code, .. }
            | Self::Ended { code, .. }
            | Self::BarrierRaised { code, .. }
            | Self::BarrierCleared { code, .. }
            | Self::Reaped { code, .. }
            | Self::ListenerFailed { code, .. } => code,
        }
    }
}
