//! Inactivity reaper.
//!
//! A session left with at most its host and no activity for longer than the
//! timeout is deleted by the host's own coordinator. Sessions whose host
//! process is gone are never reaped from here.

use super::model::Session;

/// Decides whether an observed session should be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InactivityReaper {
    timeout_ms: u64,
}

impl InactivityReaper {
    #[must_use]
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }

    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// True when `session` holds one member or fewer and has been idle for
    /// strictly longer than the timeout.
    #[must_use]
    pub fn should_reap(&self, session: &Session, now: u64) -> bool {
        session.users.len() <= 1 && session.idle_for(now) > self.timeout_ms
    }
}
