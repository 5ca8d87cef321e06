//! Fixed protocol constants shared by every participant of a session.
//!
//! These values define the wire shape of the session document. Changing them
//! breaks interoperability with devices running an older build.

// ─────────────────────────────────────────────────────────────────────────────
// Store Layout
// ─────────────────────────────────────────────────────────────────────────────

/// Default root under which all session documents live.
pub const DEFAULT_SESSIONS_ROOT: &str = "sessions";

/// Path segment separator used by the store.
pub const PATH_SEPARATOR: char = '/';

// ─────────────────────────────────────────────────────────────────────────────
// Session Document Fields
// ─────────────────────────────────────────────────────────────────────────────

pub const FIELD_USERS: &str = "users";
pub const FIELD_CURRENT_SONG: &str = "currentSong";
pub const FIELD_IS_PLAYING: &str = "isPlaying";
pub const FIELD_POSITION: &str = "position";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_LAST_ACTIVITY: &str = "lastActivity";
pub const FIELD_IS_SYNCING: &str = "isSyncing";
pub const FIELD_IS_BUFFERING: &str = "isBuffering";

// ─────────────────────────────────────────────────────────────────────────────
// Session Codes
// ─────────────────────────────────────────────────────────────────────────────

/// Smallest generated session code (inclusive).
pub const SESSION_CODE_MIN: u32 = 100_000;

/// Largest generated session code (inclusive).
pub const SESSION_CODE_MAX: u32 = 999_999;

// ─────────────────────────────────────────────────────────────────────────────
// Timing
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between `lastActivity` heartbeat writes (seconds).
pub const HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// A session with only its host left is reaped after this much inactivity (seconds).
pub const INACTIVITY_TIMEOUT_SECS: u64 = 600;

/// Capacity of the session event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Session End Reasons
// ─────────────────────────────────────────────────────────────────────────────

/// Reason reported when the session document disappears.
pub const REASON_SESSION_ENDED: &str = "Session has ended";

/// Reason reported when the session document can no longer be decoded.
pub const REASON_SESSION_DELETED: &str = "Session was deleted";

// ─────────────────────────────────────────────────────────────────────────────
// Identity Fallbacks
// ─────────────────────────────────────────────────────────────────────────────

/// Display name used when no stored account is available.
pub const GUEST_NAME: &str = "Guest";

/// Prefix of randomly generated guest ids.
pub const GUEST_ID_PREFIX: &str = "guest_";

/// Number of hex characters kept from the credential hash.
pub const USER_ID_HASH_LEN: usize = 16;
