//! Session coordinator: lifecycle, barrier, heartbeat and reaper.
//!
//! The coordinator owns at most one active session per device. Every caller
//! operation writes to the [`SessionStore`]; every snapshot pushed by the
//! store re-derives the four observable streams and may trigger a barrier
//! clear or a reap.
//!
//! Local bookkeeping sits behind a short `parking_lot::Mutex` that is never
//! held across an await. The shared document itself is never locked: safety
//! comes from each device writing only the fields it owns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::error::{CoListenError, CoListenResult};
use crate::events::{EventEmitter, SessionEvent};
use crate::identity::LocalIdentity;
use crate::protocol_constants::{
    FIELD_CURRENT_SONG, FIELD_IS_PLAYING, FIELD_IS_SYNCING, FIELD_LAST_ACTIVITY, FIELD_POSITION,
    FIELD_TIMESTAMP, REASON_SESSION_DELETED, REASON_SESSION_ENDED,
};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::session::barrier;
use crate::session::paths::{user_buffering_key, user_key};
use crate::session::{InactivityReaper, Session, SessionPath, SessionSong, SessionUser, Track};
use crate::state::Config;
use crate::store::{SessionStore, StoreUpdate, SubscriptionId};
use crate::utils::{generate_session_code, normalize_session_code, Clock, SystemClock};

/// Client-side connection state.
///
/// `Error` and `Disconnected` are left only by a fresh create or join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected(String),
    Error(String),
}

impl ConnectionState {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

/// Role of this device in the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    Host,
    Guest,
}

/// Local bookkeeping for the active session.
struct ActiveSession {
    code: String,
    path: SessionPath,
    role: SessionRole,
    subscription_id: SubscriptionId,
    cancel: CancellationToken,
    /// Distinguishes this session's tasks from those of a superseded one.
    generation: u64,
    /// Last song id this device wrote as `currentSong`.
    published_song: Option<String>,
}

/// What a background task needs to act on the active session.
#[derive(Clone)]
struct ActiveView {
    code: String,
    path: SessionPath,
    role: SessionRole,
    generation: u64,
}

impl ActiveSession {
    fn view(&self) -> ActiveView {
        ActiveView {
            code: self.code.clone(),
            path: self.path.clone(),
            role: self.role,
            generation: self.generation,
        }
    }
}

/// Coordinates one device's participation in a co-listening session.
pub struct SessionCoordinator {
    store: Arc<dyn SessionStore>,
    identity: LocalIdentity,
    emitter: Arc<dyn EventEmitter>,
    spawner: TokioSpawner,
    clock: Arc<dyn Clock>,
    /// Parent of every per-session token.
    root_cancel: CancellationToken,
    sessions_root: String,
    heartbeat_interval: Duration,
    reaper: InactivityReaper,

    active: Mutex<Option<ActiveSession>>,
    generation: AtomicU64,

    connection_tx: watch::Sender<ConnectionState>,
    session_tx: watch::Sender<Option<Session>>,
    syncing_tx: watch::Sender<bool>,
    ended_tx: watch::Sender<Option<String>>,
}

impl SessionCoordinator {
    /// Creates a new SessionCoordinator.
    ///
    /// # Arguments
    /// * `store` - Shared key-value store holding the session documents
    /// * `identity` - Local user written into `users/<id>`
    /// * `emitter` - Event emitter for lifecycle events
    /// * `config` - Timing and store layout
    /// * `spawner` - Task spawner for the subscription and heartbeat tasks
    ///
    /// # Errors
    ///
    /// Returns [`CoListenError::Configuration`] if `config` is invalid.
    pub fn new(
        store: Arc<dyn SessionStore>,
        identity: LocalIdentity,
        emitter: Arc<dyn EventEmitter>,
        config: &Config,
        spawner: TokioSpawner,
    ) -> CoListenResult<Self> {
        config.validate().map_err(CoListenError::Configuration)?;

        let (connection_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (session_tx, _) = watch::channel(None);
        let (syncing_tx, _) = watch::channel(false);
        let (ended_tx, _) = watch::channel(None);

        Ok(Self {
            store,
            identity,
            emitter,
            spawner,
            clock: Arc::new(SystemClock),
            root_cancel: CancellationToken::new(),
            sessions_root: config.sessions_root.clone(),
            heartbeat_interval: config.heartbeat_interval(),
            reaper: InactivityReaper::new(config.inactivity_timeout_ms()),
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
            connection_tx,
            session_tx,
            syncing_tx,
            ended_tx,
        })
    }

    /// Replaces the wall clock used for `timestamp` and `lastActivity`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Ties every session's background tasks to `token`.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.root_cancel = token;
        self
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Observable State
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection_tx.subscribe()
    }

    pub fn session_state(&self) -> watch::Receiver<Option<Session>> {
        self.session_tx.subscribe()
    }

    pub fn is_syncing(&self) -> watch::Receiver<bool> {
        self.syncing_tx.subscribe()
    }

    /// One-shot "session ended" notification carrying a human-readable reason.
    ///
    /// Stays set until [`acknowledge_session_ended`](Self::acknowledge_session_ended)
    /// or the next create/join.
    pub fn session_ended(&self) -> watch::Receiver<Option<String>> {
        self.ended_tx.subscribe()
    }

    /// Connection state as a `Stream`, starting with the current value.
    pub fn connection_stream(&self) -> WatchStream<ConnectionState> {
        WatchStream::new(self.connection_state())
    }

    /// Session snapshots as a `Stream`, starting with the current value.
    pub fn session_stream(&self) -> WatchStream<Option<Session>> {
        WatchStream::new(self.session_state())
    }

    #[must_use]
    pub fn current_connection(&self) -> ConnectionState {
        self.connection_tx.borrow().clone()
    }

    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.session_tx.borrow().clone()
    }

    #[must_use]
    pub fn currently_syncing(&self) -> bool {
        *self.syncing_tx.borrow()
    }

    #[must_use]
    pub fn ended_reason(&self) -> Option<String> {
        self.ended_tx.borrow().clone()
    }

    #[must_use]
    pub fn local_identity(&self) -> &LocalIdentity {
        &self.identity
    }

    /// Code of the active session, if any.
    #[must_use]
    pub fn active_code(&self) -> Option<String> {
        self.active.lock().as_ref().map(|a| a.code.clone())
    }

    #[must_use]
    pub fn is_current_user_host(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|a| a.role == SessionRole::Host)
    }

    /// Clears the one-shot ended notification.
    pub fn acknowledge_session_ended(&self) {
        self.ended_tx.send_replace(None);
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// Creates a new session hosted by this device and returns its code.
    ///
    /// Any active session is left first.
    pub async fn create_session(
        self: &Arc<Self>,
        track: Option<&Track>,
        is_playing: bool,
        position: u64,
    ) -> CoListenResult<String> {
        self.leave_if_active().await;
        self.begin_connecting();

        let code = generate_session_code();
        let path = SessionPath::new(&self.sessions_root, &code);
        let session = Session::new_hosted(
            &code,
            SessionUser::from(&self.identity),
            track.map(SessionSong::from),
            is_playing,
            position,
            self.clock.now_millis(),
        );

        let song_id = session.current_song.as_ref().map(|s| s.id.clone());
        let value = serde_json::to_value(&session).map_err(|e| self.fail_start(e))?;
        self.store
            .write(path.document(), value)
            .await
            .map_err(|e| self.fail_start(e))?;

        self.activate(&code, path, SessionRole::Host, song_id).await?;

        log::info!("[SessionCoordinator] Created session {}", code);
        self.emitter.emit_session(SessionEvent::Created {
            code: code.clone(),
            host_id: self.identity.user_id.clone(),
            timestamp: self.clock.now_millis(),
        });
        Ok(code)
    }

    /// Joins an existing session as a guest.
    ///
    /// Any active session is left first, after the code has been validated.
    pub async fn join_session(self: &Arc<Self>, code: &str) -> CoListenResult<()> {
        let code =
            normalize_session_code(code).ok_or_else(|| CoListenError::InvalidCode(code.into()))?;

        self.leave_if_active().await;
        self.begin_connecting();

        let path = SessionPath::new(&self.sessions_root, &code);
        let existing = self
            .store
            .read(path.document())
            .await
            .map_err(|e| self.fail_start(e))?;

        let found = existing.is_some_and(|value| Session::from_snapshot(value).is_ok());
        if !found {
            return Err(self.fail_start(CoListenError::NotFound(code)));
        }

        let user = serde_json::to_value(SessionUser::from(&self.identity))
            .map_err(|e| self.fail_start(e))?;
        let mut updates = Map::new();
        updates.insert(user_key(&self.identity.user_id), user);
        updates.insert(
            FIELD_LAST_ACTIVITY.to_string(),
            Value::from(self.clock.now_millis()),
        );
        self.store
            .merge_write(path.document(), updates)
            .await
            .map_err(|e| self.fail_start(e))?;

        self.activate(&code, path, SessionRole::Guest, None).await?;

        log::info!("[SessionCoordinator] Joined session {}", code);
        self.emitter.emit_session(SessionEvent::Joined {
            code,
            user_id: self.identity.user_id.clone(),
            timestamp: self.clock.now_millis(),
        });
        Ok(())
    }

    /// Leaves the active session.
    ///
    /// A host deletes the whole document; a guest removes only its own
    /// membership record. Background tasks are cancelled before the final
    /// write, and local state resets whatever the write's outcome.
    pub async fn leave_session(&self) {
        let Some(active) = self.active.lock().take() else {
            self.reset_local_state();
            return;
        };

        active.cancel.cancel();
        self.store.unsubscribe(active.subscription_id).await;

        let result = match active.role {
            SessionRole::Host => self.store.delete(active.path.document()).await,
            SessionRole::Guest => {
                let mut updates = Map::new();
                updates.insert(user_key(&self.identity.user_id), Value::Null);
                self.store.merge_write(active.path.document(), updates).await
            }
        };
        if let Err(e) = result {
            log::warn!(
                "[SessionCoordinator] Leave write for {} failed: {}",
                active.code,
                e
            );
        }

        self.reset_local_state();

        log::info!(
            "[SessionCoordinator] Left session {} as {:?}",
            active.code,
            active.role
        );
        self.emitter.emit_session(SessionEvent::Left {
            code: active.code,
            was_host: active.role == SessionRole::Host,
            timestamp: self.clock.now_millis(),
        });
    }

    /// Leaves any active session. Used on graceful shutdown.
    pub async fn shutdown(&self) {
        self.leave_session().await;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Playback Updates
    // ─────────────────────────────────────────────────────────────────────────────

    /// Publishes the host's playback transport.
    ///
    /// No-op unless connected with a session loaded. Ignored on guests. A
    /// track is always written as `currentSong`; when it differs from the last
    /// song this device published (or, failing that, the snapshot's song) the
    /// same merge also raises the buffering barrier. `None` leaves
    /// `currentSong` as is.
    pub async fn update_player_state(&self, track: Option<&Track>, is_playing: bool, position: u64) {
        if !self.current_connection().is_connected() {
            return;
        }
        let Some(current) = self.current_session() else {
            return;
        };

        let song = track.map(SessionSong::from);
        let song_value = match song.as_ref().map(serde_json::to_value).transpose() {
            Ok(value) => value,
            Err(e) => {
                log::warn!("[SessionCoordinator] Failed to encode song: {}", e);
                return;
            }
        };

        let (view, raises_barrier, previous_song) = {
            let mut guard = self.active.lock();
            let Some(active) = guard.as_mut() else {
                return;
            };
            if active.role != SessionRole::Host {
                log::debug!(
                    "[SessionCoordinator] Ignoring player update from guest in {}",
                    active.code
                );
                return;
            }

            let previous = active.published_song.clone();
            let raises = song.as_ref().is_some_and(|song| match previous.as_deref() {
                Some(published) => published != song.id,
                None => barrier::track_changed(current.current_song.as_ref(), song),
            });
            if let Some(song) = song.as_ref() {
                active.published_song = Some(song.id.clone());
            }
            (active.view(), raises, previous)
        };

        let now = self.clock.now_millis();
        let mut updates = Map::new();
        updates.insert(FIELD_IS_PLAYING.to_string(), Value::Bool(is_playing));
        updates.insert(FIELD_POSITION.to_string(), Value::from(position));
        updates.insert(FIELD_TIMESTAMP.to_string(), Value::from(now));
        updates.insert(FIELD_LAST_ACTIVITY.to_string(), Value::from(now));
        if let Some(value) = song_value {
            updates.insert(FIELD_CURRENT_SONG.to_string(), value);
        }
        if raises_barrier {
            updates.insert(FIELD_IS_SYNCING.to_string(), Value::Bool(true));
        }

        if let Err(e) = self.store.merge_write(view.path.document(), updates).await {
            log::warn!(
                "[SessionCoordinator] Player update for {} failed: {}",
                view.code,
                e
            );
            if song.is_some() {
                self.restore_published_song(view.generation, previous_song);
            }
            return;
        }

        if let Some(song) = song.filter(|_| raises_barrier) {
            log::debug!(
                "[SessionCoordinator] Barrier raised in {} for {}",
                view.code,
                song.id
            );
            self.emitter.emit_session(SessionEvent::BarrierRaised {
                code: view.code,
                song_id: song.id,
                timestamp: now,
            });
        }
    }

    /// Publishes this device's own buffering flag.
    ///
    /// Clearing the flag evaluates the barrier immediately against the latest
    /// snapshot, with the local user counted as ready.
    pub async fn update_buffering_state(&self, is_buffering: bool) {
        if !self.current_connection().is_connected() {
            return;
        }
        let Some(view) = self.active_view() else {
            return;
        };

        let mut updates = Map::new();
        updates.insert(
            user_buffering_key(&self.identity.user_id),
            Value::Bool(is_buffering),
        );
        if let Err(e) = self.store.merge_write(view.path.document(), updates).await {
            log::warn!(
                "[SessionCoordinator] Buffering update for {} failed: {}",
                view.code,
                e
            );
            return;
        }

        if is_buffering {
            return;
        }
        let ready = self
            .current_session()
            .is_some_and(|s| barrier::is_ready_after_local_clear(&s, &self.identity.user_id));
        if ready {
            self.clear_barrier(&view).await;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────────

    async fn leave_if_active(&self) {
        if self.active.lock().is_some() {
            self.leave_session().await;
        }
    }

    fn begin_connecting(&self) {
        self.ended_tx.send_replace(None);
        self.connection_tx.send_replace(ConnectionState::Connecting);
    }

    /// Converts a start-up failure into the caller's error and resets to
    /// `Disconnected`.
    fn fail_start<E: Into<CoListenError>>(&self, err: E) -> CoListenError {
        let err = err.into();
        log::warn!("[SessionCoordinator] Failed to start session: {}", err);
        self.connection_tx.send_replace(ConnectionState::Disconnected);
        err
    }

    fn reset_local_state(&self) {
        self.connection_tx.send_replace(ConnectionState::Disconnected);
        self.session_tx.send_replace(None);
        self.syncing_tx.send_replace(false);
    }

    fn active_view(&self) -> Option<ActiveView> {
        self.active.lock().as_ref().map(ActiveSession::view)
    }

    fn view_for(&self, generation: u64) -> Option<ActiveView> {
        self.active
            .lock()
            .as_ref()
            .filter(|a| a.generation == generation)
            .map(ActiveSession::view)
    }

    fn restore_published_song(&self, generation: u64, song_id: Option<String>) {
        if let Some(active) = self.active.lock().as_mut() {
            if active.generation == generation {
                active.published_song = song_id;
            }
        }
    }

    /// Subscribes to the session and spawns its background tasks.
    async fn activate(
        self: &Arc<Self>,
        code: &str,
        path: SessionPath,
        role: SessionRole,
        published_song: Option<String>,
    ) -> CoListenResult<()> {
        let subscription = match self.store.subscribe(path.document()).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.rollback(&path, role).await;
                return Err(self.fail_start(e));
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = self.root_cancel.child_token();

        let superseded = self.active.lock().replace(ActiveSession {
            code: code.to_string(),
            path,
            role,
            subscription_id: subscription.id,
            cancel: cancel.clone(),
            generation,
            published_song,
        });
        if let Some(previous) = superseded {
            log::warn!(
                "[SessionCoordinator] Session {} superseded by {}",
                previous.code,
                code
            );
            previous.cancel.cancel();
            self.store.unsubscribe(previous.subscription_id).await;
        }

        let weak = Arc::downgrade(self);
        self.spawner.spawn_until_cancelled(
            cancel.clone(),
            run_subscription(weak.clone(), generation, subscription.updates, cancel.clone()),
        );
        self.spawner.spawn_until_cancelled(
            cancel,
            run_heartbeat(weak, generation, self.heartbeat_interval),
        );
        Ok(())
    }

    /// Best-effort removal of what a failed start already wrote.
    async fn rollback(&self, path: &SessionPath, role: SessionRole) {
        let result = match role {
            SessionRole::Host => self.store.delete(path.document()).await,
            SessionRole::Guest => {
                let mut updates = Map::new();
                updates.insert(user_key(&self.identity.user_id), Value::Null);
                self.store.merge_write(path.document(), updates).await
            }
        };
        if let Err(e) = result {
            log::warn!("[SessionCoordinator] Rollback failed: {}", e);
        }
    }

    /// Applies one decoded snapshot. Returns false if the session is no
    /// longer current.
    async fn handle_snapshot(&self, generation: u64, session: Session) -> bool {
        // Publishing under the guard keeps a concurrent leave from being
        // overwritten by a stale snapshot.
        let view = {
            let guard = self.active.lock();
            let Some(active) = guard.as_ref().filter(|a| a.generation == generation) else {
                return false;
            };

            let syncing = session.is_syncing;
            self.session_tx.send_replace(Some(session.clone()));
            self.syncing_tx.send_if_modified(|current| {
                let changed = *current != syncing;
                *current = syncing;
                changed
            });
            let connected = ConnectionState::Connected(active.code.clone());
            self.connection_tx.send_if_modified(|current| {
                let changed = *current != connected;
                *current = connected;
                changed
            });
            active.view()
        };

        if barrier::is_ready(&session) {
            self.clear_barrier(&view).await;
        }

        if view.role == SessionRole::Host {
            let now = self.clock.now_millis();
            if self.reaper.should_reap(&session, now) {
                self.reap(&view, session.idle_for(now)).await;
            }
        }
        true
    }

    /// Writes `isSyncing = false`. Idempotent across devices.
    async fn clear_barrier(&self, view: &ActiveView) {
        if let Err(e) = self
            .store
            .merge_write(view.path.document(), barrier::clear_update())
            .await
        {
            log::warn!(
                "[SessionCoordinator] Barrier clear for {} failed: {}",
                view.code,
                e
            );
            return;
        }

        log::debug!("[SessionCoordinator] Barrier cleared in {}", view.code);
        self.emitter.emit_session(SessionEvent::BarrierCleared {
            code: view.code.clone(),
            timestamp: self.clock.now_millis(),
        });
    }

    /// Deletes an abandoned session. The resulting absent snapshot ends it
    /// locally.
    async fn reap(&self, view: &ActiveView, idle_ms: u64) {
        log::info!(
            "[SessionCoordinator] Reaping session {} (idle {} ms)",
            view.code,
            idle_ms
        );
        self.emitter.emit_session(SessionEvent::Reaped {
            code: view.code.clone(),
            idle_ms,
            timestamp: self.clock.now_millis(),
        });
        if let Err(e) = self.store.delete(view.path.document()).await {
            log::warn!("[SessionCoordinator] Reap of {} failed: {}", view.code, e);
        }
    }

    /// Tears down a session whose document vanished or became undecodable.
    async fn end_session(&self, generation: u64, reason: &str) {
        let active = {
            let mut guard = self.active.lock();
            if guard.as_ref().map(|a| a.generation) != Some(generation) {
                return;
            }
            guard.take()
        };
        let Some(active) = active else {
            return;
        };

        self.reset_local_state();
        self.ended_tx.send_replace(Some(reason.to_string()));

        log::info!(
            "[SessionCoordinator] Session {} ended: {}",
            active.code,
            reason
        );
        self.emitter.emit_session(SessionEvent::Ended {
            code: active.code.clone(),
            reason: reason.to_string(),
            timestamp: self.clock.now_millis(),
        });

        self.store.unsubscribe(active.subscription_id).await;
        active.cancel.cancel();
    }

    /// Moves to `Error(message)` and keeps the bookkeeping, so the caller can
    /// leave and rejoin.
    fn fail_listener(&self, generation: u64, message: String) {
        let view = {
            let guard = self.active.lock();
            let Some(active) = guard.as_ref().filter(|a| a.generation == generation) else {
                return;
            };
            self.connection_tx
                .send_replace(ConnectionState::Error(message.clone()));
            active.view()
        };

        log::warn!(
            "[SessionCoordinator] Listener for {} failed: {}",
            view.code,
            message
        );
        self.emitter.emit_session(SessionEvent::ListenerFailed {
            code: view.code,
            message,
            timestamp: self.clock.now_millis(),
        });
    }

    async fn heartbeat(&self, generation: u64) -> bool {
        let Some(view) = self.view_for(generation) else {
            return false;
        };
        if !self.current_connection().is_connected() {
            return true;
        }

        let mut updates = Map::new();
        updates.insert(
            FIELD_LAST_ACTIVITY.to_string(),
            Value::from(self.clock.now_millis()),
        );
        if let Err(e) = self.store.merge_write(view.path.document(), updates).await {
            log::debug!("[SessionCoordinator] Heartbeat for {} failed: {}", view.code, e);
        }
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Background Tasks
// ─────────────────────────────────────────────────────────────────────────────

/// Drives one session's subscription until it ends, errors or is cancelled.
async fn run_subscription(
    coordinator: Weak<SessionCoordinator>,
    generation: u64,
    mut updates: mpsc::UnboundedReceiver<StoreUpdate>,
    cancel: CancellationToken,
) {
    loop {
        let update = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            update = updates.recv() => update,
        };
        let Some(update) = update else {
            log::debug!("[SessionCoordinator] Subscription stream closed");
            break;
        };
        if cancel.is_cancelled() {
            break;
        }
        let Some(this) = coordinator.upgrade() else {
            break;
        };

        match update {
            StoreUpdate::Snapshot(None) => {
                this.end_session(generation, REASON_SESSION_ENDED).await;
                break;
            }
            StoreUpdate::Snapshot(Some(value)) => match Session::from_snapshot(value) {
                Ok(session) => {
                    if !this.handle_snapshot(generation, session).await {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("[SessionCoordinator] Undecodable snapshot: {}", e);
                    this.end_session(generation, REASON_SESSION_DELETED).await;
                    break;
                }
            },
            StoreUpdate::ListenerError(message) => {
                // The listener is dead; recovery is an explicit rejoin.
                this.fail_listener(generation, message);
                break;
            }
        }
    }
}

/// Refreshes `lastActivity` every `period` while connected.
async fn run_heartbeat(
    coordinator: Weak<SessionCoordinator>,
    generation: u64,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(this) = coordinator.upgrade() else {
            break;
        };
        if !this.heartbeat(generation).await {
            break;
        }
    }
}
