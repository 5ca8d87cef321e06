//! Buffering barrier.
//!
//! When the host changes track it raises `isSyncing`; every participant then
//! flips its own `isBuffering` while loading. Whichever participant observes
//! `isSyncing && no one buffering` first writes `isSyncing = false`. That
//! clear is idempotent, so concurrent clearers converge on the same value.

use serde_json::{Map, Value};

use super::model::{Session, SessionSong};
use crate::protocol_constants::FIELD_IS_SYNCING;

/// True when the barrier is raised and nobody is still buffering.
#[must_use]
pub fn is_ready(session: &Session) -> bool {
    session.is_syncing && !session.any_buffering()
}

/// Like [`is_ready`], but treats `user_id` as already finished.
///
/// Used by a participant that has just written its own `isBuffering = false`
/// and evaluates against a snapshot that may predate that write.
#[must_use]
pub fn is_ready_after_local_clear(session: &Session, user_id: &str) -> bool {
    session.is_syncing
        && session
            .users
            .iter()
            .all(|(id, user)| id == user_id || !user.is_buffering)
}

/// Whether moving to `next` counts as a track change that raises the barrier.
#[must_use]
pub fn track_changed(current: Option<&SessionSong>, next: &SessionSong) -> bool {
    current.map_or(true, |song| song.id != next.id)
}

/// Merge update that clears the barrier.
#[must_use]
pub fn clear_update() -> Map<String, Value> {
    let mut update = Map::new();
    update.insert(FIELD_IS_SYNCING.to_string(), Value::Bool(false));
    update
}
