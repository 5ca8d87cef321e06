//! Colisten Core - co-listening session coordination.
//!
//! Several devices listen to the same track in approximate lockstep. One
//! device hosts a session, others join with a six-digit code, and playback
//! state is shared through a push-notifying key-value store.
//!
//! # Architecture
//!
//! - [`session`]: Wire schema of the session document and the pure barrier
//!   and reaper rules
//! - [`store`]: The [`SessionStore`] abstraction and an in-memory implementation
//! - [`services`]: The [`SessionCoordinator`] that drives one device
//! - [`identity`]: Local user identity from credential state
//! - [`events`]: Lifecycle events for in-process subscribers
//! - [`runtime`]: Task spawning abstraction
//! - [`state`]: Configuration
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`SessionStore`](store::SessionStore): The shared store
//! - [`CredentialSource`](identity::CredentialSource): On-device credentials
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Emitting lifecycle events
//! - [`Clock`](utils::Clock): Wall-clock time for session timestamps

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod error;
pub mod events;
pub mod identity;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod session;
pub mod state;
pub mod store;
pub mod utils;

// Re-export commonly used types at the crate root
pub use error::{CoListenError, CoListenResult, ErrorCode, StoreError, StoreResult};
pub use events::{
    BroadcastEventBridge, EventEmitter, LoggingEventEmitter, NoopEventEmitter, SessionEvent,
};
pub use identity::{CredentialSource, IdentityResolver, LocalIdentity, StaticCredentials, StoredAccount};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use session::{Session, SessionSong, SessionUser, Track, TrackSource};
pub use state::Config;
pub use store::{InMemorySessionStore, SessionStore, StoreOperation, StoreUpdate, Subscription};
pub use utils::{now_millis, Clock, ManualClock, SystemClock};

// Re-export service types
pub use services::{ConnectionState, SessionCoordinator, SessionRole};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};
