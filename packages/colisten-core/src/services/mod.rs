//! Application services layer.
//!
//! This module contains the coordinator that orchestrates between callers
//! (playback layer, UI) and the shared store.

pub mod coordinator;

pub use coordinator::{ConnectionState, SessionCoordinator, SessionRole};
