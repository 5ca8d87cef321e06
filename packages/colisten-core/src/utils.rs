//! General utilities shared across the crate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::protocol_constants::{SESSION_CODE_MAX, SESSION_CODE_MIN};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Source of wall-clock milliseconds for session timestamps.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// [`Clock`] backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        now_millis()
    }
}

/// Manually driven [`Clock`] for simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Codes
// ─────────────────────────────────────────────────────────────────────────────

/// Generates a 6-digit numeric session code, drawn uniformly at random.
///
/// No uniqueness check is performed against live sessions.
#[must_use]
pub fn generate_session_code() -> String {
    rand::thread_rng()
        .gen_range(SESSION_CODE_MIN..=SESSION_CODE_MAX)
        .to_string()
}

/// Normalizes a user-entered session code.
///
/// Returns `None` if the code is empty or could escape its store path.
#[must_use]
pub fn normalize_session_code(code: &str) -> Option<String> {
    let trimmed = code.trim();
    if trimmed.is_empty() || trimmed.contains('/') || trimmed.contains('.') {
        return None;
    }
    Some(trimmed.to_string())
}
