//! Event emitter abstraction for decoupling the coordinator from transport.
//!
//! The coordinator depends on the [`EventEmitter`] trait rather than a
//! concrete broadcast channel, enabling testing and alternative delivery.

use super::SessionEvent;

/// Trait for emitting session events without knowledge of transport.
///
/// # Example
///
/// ```ignore
/// struct PlaybackBridge {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl PlaybackBridge {
///     fn on_created(&self, code: String) {
///         self.emitter.emit_session(SessionEvent::Created { ... });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a session lifecycle event.
    fn emit_session(&self, event: SessionEvent);
}

/// No-op emitter for headless use or testing.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_session(&self, _event: SessionEvent) {
        // No-op
    }
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, code = event.code(), "session_event");
    }
}
