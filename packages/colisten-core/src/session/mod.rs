//! Session document model and the pure rules evaluated against it.

pub mod barrier;
pub mod model;
pub mod paths;
pub mod reaper;

pub use model::{Session, SessionSong, SessionUser, Track, TrackSource};
pub use paths::SessionPath;
pub use reaper::InactivityReaper;
