//! Bridge implementation that maps session events to broadcast transport.
//!
//! The [`BroadcastEventBridge`] lives at the boundary between the coordinator
//! and whoever follows its lifecycle (playback layer, UI, simulator).

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::SessionEvent;

/// Bridges session events to a `tokio::sync::broadcast` channel.
///
/// The bridge also forwards to an optional external emitter that can be set
/// after construction.
///
/// # Thread Safety
///
/// The bridge is `Send + Sync` and can be shared across async tasks.
/// The external emitter uses `RwLock` to allow setting it after construction.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<SessionEvent>,
    /// Optional external emitter for platform-specific event delivery
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self::with_sender(tx)
    }

    /// Creates a new bridge wrapping an existing broadcast sender.
    pub fn with_sender(tx: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter, for example a [`LoggingEventEmitter`].
    ///
    /// [`LoggingEventEmitter`]: super::LoggingEventEmitter
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Returns a reference to the broadcast sender.
    pub fn sender(&self) -> &broadcast::Sender<SessionEvent> {
        &self.tx
    }
}

impl EventEmitter for BroadcastEventBridge {
    fn emit_session(&self, event: SessionEvent) {
        if let Some(ref emitter) = *self.external_emitter.read() {
            emitter.emit_session(event.clone());
        }
        if let Err(e) = self.tx.send(event) {
            log::trace!("[EventBridge] No broadcast receivers: {}", e);
        }
    }
}
