//! Wire schema of the shared session document.
//!
//! Every field is serialized in camelCase so that devices running other
//! clients read and write the same document shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::LocalIdentity;

/// Where a local track was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackSource {
    Youtube,
    Jiosaavn,
    Local,
    Downloaded,
}

impl TrackSource {
    /// The tag stored in [`SessionSong::source`].
    #[must_use]
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Youtube => "YOUTUBE",
            Self::Jiosaavn => "JIOSAAVN",
            Self::Local => "LOCAL",
            Self::Downloaded => "DOWNLOADED",
        }
    }
}

/// The playback layer's own track representation.
///
/// Only the fields remote participants need are copied into a
/// [`SessionSong`] when the track becomes current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    pub source: TrackSource,
}

/// Denormalized snapshot of the currently playing track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionSong {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub thumbnail_url: String,
    /// Duration in milliseconds.
    pub duration: u64,
    pub source: String,
}

impl From<&Track> for SessionSong {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone().unwrap_or_default(),
            thumbnail_url: track.thumbnail_url.clone().unwrap_or_default(),
            duration: track.duration_ms,
            source: track.source.as_tag().to_string(),
        }
    }
}

/// One participant of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
    /// Reserved presence flag. Written as `true` on join, never enforced.
    pub is_active: bool,
    /// True while this device is loading the current track.
    pub is_buffering: bool,
}

impl Default for SessionUser {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            avatar_url: String::new(),
            is_active: true,
            is_buffering: false,
        }
    }
}

impl From<&LocalIdentity> for SessionUser {
    fn from(identity: &LocalIdentity) -> Self {
        Self {
            id: identity.user_id.clone(),
            name: identity.display_name.clone(),
            avatar_url: identity.avatar_url.clone(),
            ..Default::default()
        }
    }
}

/// The root synchronized object of one co-listening group.
///
/// `code` and `hostId` carry no serde default: a subtree without them (for
/// example one resurrected by a late write after deletion) fails to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub code: String,
    pub host_id: String,
    #[serde(default)]
    pub users: BTreeMap<String, SessionUser>,
    #[serde(default)]
    pub current_song: Option<SessionSong>,
    #[serde(default)]
    pub is_playing: bool,
    /// Last known playback offset in milliseconds.
    #[serde(default)]
    pub position: u64,
    /// Wall-clock ms at which `position`/`is_playing` were last set.
    #[serde(default)]
    pub timestamp: u64,
    /// Wall-clock ms heartbeat.
    #[serde(default)]
    pub last_activity: u64,
    #[serde(default)]
    pub is_syncing: bool,
}

impl Session {
    /// Builds the initial document written by the host on creation.
    #[must_use]
    pub fn new_hosted(
        code: &str,
        host: SessionUser,
        current_song: Option<SessionSong>,
        is_playing: bool,
        position: u64,
        now: u64,
    ) -> Self {
        let host_id = host.id.clone();
        let mut users = BTreeMap::new();
        users.insert(host_id.clone(), host);

        Self {
            code: code.to_string(),
            host_id,
            users,
            current_song,
            is_playing,
            position,
            timestamp: now,
            last_activity: now,
            is_syncing: false,
        }
    }

    /// Decodes a store snapshot.
    pub fn from_snapshot(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    #[must_use]
    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id == user_id
    }

    #[must_use]
    pub fn user(&self, user_id: &str) -> Option<&SessionUser> {
        self.users.get(user_id)
    }

    /// Whether any participant is still loading the current track.
    #[must_use]
    pub fn any_buffering(&self) -> bool {
        self.users.values().any(|u| u.is_buffering)
    }

    /// Participants still loading the current track.
    #[must_use]
    pub fn buffering_users(&self) -> Vec<&SessionUser> {
        self.users.values().filter(|u| u.is_buffering).collect()
    }

    /// Participants that finished loading the current track.
    #[must_use]
    pub fn ready_users(&self) -> Vec<&SessionUser> {
        self.users.values().filter(|u| !u.is_buffering).collect()
    }

    /// Milliseconds since the last recorded activity.
    #[must_use]
    pub fn idle_for(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_activity)
    }

    /// Extrapolates the host's playback position to `now`.
    ///
    /// `position` is advisory and not ticked by the host, so readers add the
    /// elapsed time since `timestamp` while playing. The result is capped at
    /// the song duration when one is known.
    #[must_use]
    pub fn estimated_position(&self, now: u64) -> u64 {
        if !self.is_playing {
            return self.position;
        }

        let estimate = self
            .position
            .saturating_add(now.saturating_sub(self.timestamp));

        match self.current_song.as_ref().map(|s| s.duration) {
            Some(duration) if duration > 0 => estimate.min(duration),
            _ => estimate,
        }
    }
}
