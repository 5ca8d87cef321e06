//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::{CoListenError, CoListenResult};
use crate::events::{BroadcastEventBridge, EventEmitter, SessionEvent};
use crate::identity::{CredentialSource, IdentityResolver, LocalIdentity};
use crate::runtime::TokioSpawner;
use crate::services::SessionCoordinator;
use crate::state::Config;
use crate::store::SessionStore;

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Coordinates this device's session.
    pub coordinator: Arc<SessionCoordinator>,
    /// Identity resolved from the credential source.
    pub identity: LocalIdentity,
    /// Shared store the coordinator writes to.
    pub store: Arc<dyn SessionStore>,
    /// Broadcast channel sender for session events.
    pub broadcast_tx: broadcast::Sender<SessionEvent>,
    /// Event bridge for emitting events to subscribers and optional external consumers.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Initiates graceful shutdown of all services.
    ///
    /// Leaves the active session (deleting it if hosted) before cancelling
    /// the remaining background tasks.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.coordinator.shutdown().await;
        self.cancel_token.cancel();

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps the co-listen services with their dependencies.
///
/// Wiring order:
///
/// 1. Configuration validation
/// 2. Shared infrastructure (spawner, broadcast channel, cancellation token)
/// 3. Local identity (from the credential source)
/// 4. Session coordinator (depends on all of the above)
///
/// # Arguments
/// * `config` - Core configuration
/// * `store` - Shared session store
/// * `credentials` - On-device credential state
///
/// # Errors
///
/// Returns [`CoListenError::Configuration`] if `config` is invalid.
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime context.
pub fn bootstrap_services(
    config: &Config,
    store: Arc<dyn SessionStore>,
    credentials: &dyn CredentialSource,
) -> CoListenResult<BootstrappedServices> {
    config.validate().map_err(CoListenError::Configuration)?;

    let spawner = TokioSpawner::current();

    let (broadcast_tx, _) = broadcast::channel::<SessionEvent>(config.event_channel_capacity);
    let event_bridge = Arc::new(BroadcastEventBridge::with_sender(broadcast_tx.clone()));

    let cancel_token = CancellationToken::new();

    let identity = IdentityResolver::resolve(credentials);

    let coordinator = Arc::new(
        SessionCoordinator::new(
            Arc::clone(&store),
            identity.clone(),
            Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
            config,
            spawner.clone(),
        )?
        .with_cancel_token(cancel_token.clone()),
    );

    log::info!(
        "[Bootstrap] Services ready for user {} (root '{}')",
        identity.user_id,
        config.sessions_root
    );

    Ok(BootstrappedServices {
        coordinator,
        identity,
        store,
        broadcast_tx,
        event_bridge,
        spawner,
        cancel_token,
    })
}
