//! End-to-end scenarios: several coordinators sharing one in-memory store.

use std::sync::Arc;
use std::time::Duration;

use colisten_core::{
    BroadcastEventBridge, Config, ConnectionState, EventEmitter, InMemorySessionStore, LocalIdentity,
    ManualClock, NoopEventEmitter, Session, SessionCoordinator, SessionEvent, TokioSpawner,
    Track, TrackSource,
};
use futures::future::join_all;
use serde_json::Value;

const START: u64 = 1_700_000_000_000;
const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    store: Arc<InMemorySessionStore>,
    clock: Arc<ManualClock>,
    config: Config,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(Config::default())
    }

    fn with_config(config: Config) -> Self {
        Self {
            store: Arc::new(InMemorySessionStore::new()),
            clock: Arc::new(ManualClock::new(START)),
            config,
        }
    }

    fn device(&self, id: &str) -> Arc<SessionCoordinator> {
        self.device_with_bridge(id, None)
    }

    fn device_with_bridge(
        &self,
        id: &str,
        bridge: Option<Arc<BroadcastEventBridge>>,
    ) -> Arc<SessionCoordinator> {
        let emitter: Arc<dyn EventEmitter> = match bridge {
            Some(bridge) => bridge,
            None => Arc::new(NoopEventEmitter),
        };
        Arc::new(
            SessionCoordinator::new(
                self.store.clone(),
                LocalIdentity {
                    user_id: id.to_string(),
                    display_name: format!("User {id}"),
                    avatar_url: String::new(),
                },
                emitter,
                &self.config,
                TokioSpawner::current(),
            )
            .unwrap()
            .with_clock(self.clock.clone()),
        )
    }

    fn doc(&self, code: &str) -> Option<Value> {
        self.store.get(&format!("sessions/{code}"))
    }
}

fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        title: format!("Track {id}"),
        artist: "Artist".to_string(),
        album: None,
        thumbnail_url: None,
        duration_ms: 240_000,
        source: TrackSource::Youtube,
    }
}

async fn wait_state<F>(device: &SessionCoordinator, predicate: F)
where
    F: Fn(&ConnectionState) -> bool,
{
    let mut rx = device.connection_state();
    tokio::time::timeout(WAIT, rx.wait_for(|s| predicate(s)))
        .await
        .expect("timed out waiting for connection state")
        .expect("coordinator dropped");
}

async fn wait_session<F>(device: &SessionCoordinator, predicate: F)
where
    F: Fn(&Session) -> bool,
{
    let mut rx = device.session_state();
    tokio::time::timeout(WAIT, rx.wait_for(|s| s.as_ref().is_some_and(|s| predicate(s))))
        .await
        .expect("timed out waiting for session snapshot")
        .expect("coordinator dropped");
}

async fn wait_syncing(device: &SessionCoordinator, expected: bool) {
    let mut rx = device.is_syncing();
    tokio::time::timeout(WAIT, rx.wait_for(|s| *s == expected))
        .await
        .expect("timed out waiting for syncing flag")
        .expect("coordinator dropped");
}

/// Host creates with `t1`; every guest joins and is connected.
async fn start_session(
    harness: &Harness,
    host: &Arc<SessionCoordinator>,
    guests: &[Arc<SessionCoordinator>],
) -> String {
    let code = host
        .create_session(Some(&track("t1")), false, 0)
        .await
        .unwrap();
    for guest in guests {
        guest.join_session(&code).await.unwrap();
        wait_state(guest, ConnectionState::is_connected).await;
    }
    wait_session(host, |s| s.users.len() == guests.len() + 1).await;
    assert!(harness.doc(&code).is_some());
    code
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios A-E
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_create() {
    let harness = Harness::new();
    let host = harness.device("H");

    let code = host
        .create_session(Some(&track("t1")), false, 0)
        .await
        .unwrap();

    let doc = harness.doc(&code).unwrap();
    assert_eq!(doc["code"], code);
    assert_eq!(doc["hostId"], "H");
    let users = doc["users"].as_object().unwrap();
    assert_eq!(users.len(), 1);
    assert!(users.contains_key("H"));
    assert_eq!(doc["currentSong"]["id"], "t1");
    assert_eq!(doc["isSyncing"], false);
    assert_eq!(doc["isPlaying"], false);
    assert_eq!(doc["position"], 0);
}

#[tokio::test]
async fn scenario_b_join() {
    let harness = Harness::new();
    let host = harness.device("H");
    let guest = harness.device("G");

    let code = host.create_session(Some(&track("t1")), false, 0).await.unwrap();
    guest.join_session(&code).await.unwrap();
    wait_state(&guest, ConnectionState::is_connected).await;

    let doc = harness.doc(&code).unwrap();
    assert_eq!(doc["users"]["G"]["name"], "User G");
    assert_eq!(doc["users"]["G"]["isActive"], true);
    assert_eq!(guest.current_connection(), ConnectionState::Connected(code));
    assert!(!guest.is_current_user_host());
    assert!(host.is_current_user_host());
}

#[tokio::test]
async fn scenario_c_track_change_raises_barrier_everywhere() {
    let harness = Harness::new();
    let host = harness.device("H");
    let guests = vec![harness.device("G1"), harness.device("G2")];
    let code = start_session(&harness, &host, &guests).await;

    // Keep the barrier closed so every device can observe it raised.
    guests[0].update_buffering_state(true).await;
    wait_session(&host, |s| s.any_buffering()).await;
    harness.store.clear_operations();

    host.update_player_state(Some(&track("t2")), true, 0).await;

    let ops = harness.store.operations();
    let keys = ops[0].merged_keys();
    assert!(keys.contains(&"currentSong"));
    assert!(keys.contains(&"isSyncing"));
    assert_eq!(harness.doc(&code).unwrap()["currentSong"]["id"], "t2");

    for device in guests.iter().chain(std::iter::once(&host)) {
        wait_syncing(device, true).await;
    }
}

#[tokio::test]
async fn scenario_d_all_ready_clears_barrier() {
    let harness = Harness::new();
    let host = harness.device("H");
    let guest = harness.device("G");
    let code = start_session(&harness, &host, std::slice::from_ref(&guest)).await;

    host.update_buffering_state(true).await;
    guest.update_buffering_state(true).await;
    host.update_player_state(Some(&track("t2")), true, 0).await;
    wait_syncing(&guest, true).await;
    wait_syncing(&host, true).await;

    let (a, b) = (
        host.update_buffering_state(false),
        guest.update_buffering_state(false),
    );
    tokio::join!(a, b);

    wait_syncing(&host, false).await;
    wait_syncing(&guest, false).await;
    assert_eq!(harness.doc(&code).unwrap()["isSyncing"], false);
}

#[tokio::test]
async fn scenario_e_host_leave_ends_guest_session() {
    let harness = Harness::new();
    let host = harness.device("H");
    let bridge = Arc::new(BroadcastEventBridge::new(16));
    let mut events = bridge.subscribe();
    let guest = harness.device_with_bridge("G", Some(bridge));
    let code = start_session(&harness, &host, std::slice::from_ref(&guest)).await;

    host.leave_session().await;
    assert!(harness.doc(&code).is_none());

    let mut ended = guest.session_ended();
    let reason = tokio::time::timeout(WAIT, ended.wait_for(Option::is_some))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(reason.as_deref(), Some("Session has ended"));
    assert_eq!(guest.current_connection(), ConnectionState::Disconnected);
    assert!(guest.current_session().is_none());

    let mut saw_ended = false;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Ended { code: ended_code, reason, .. } = event {
            assert_eq!(ended_code, code);
            assert_eq!(reason, "Session has ended");
            saw_ended = true;
        }
    }
    assert!(saw_ended);
}

// ─────────────────────────────────────────────────────────────────────────────
// Properties
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn guest_leave_removes_only_that_guest() {
    let harness = Harness::new();
    let host = harness.device("H");
    let guests = vec![harness.device("G1"), harness.device("G2")];
    let code = start_session(&harness, &host, &guests).await;

    let mut expected = harness.doc(&code).unwrap();
    expected["users"].as_object_mut().unwrap().remove("G1");

    guests[0].leave_session().await;

    assert_eq!(harness.doc(&code).unwrap(), expected);
    assert_eq!(guests[0].current_connection(), ConnectionState::Disconnected);
    wait_session(&guests[1], |s| !s.users.contains_key("G1")).await;
    assert_eq!(
        guests[1].current_connection(),
        ConnectionState::Connected(code)
    );
}

#[tokio::test]
async fn interleaved_partitioned_writes_keep_every_field() {
    let harness = Harness::new();
    let host = harness.device("H");
    let guests: Vec<_> = (1..=4).map(|i| harness.device(&format!("G{i}"))).collect();
    let code = start_session(&harness, &host, &guests).await;

    let buffering = join_all(guests.iter().enumerate().map(|(i, guest)| {
        let guest = guest.clone();
        async move { guest.update_buffering_state(i % 2 == 0).await }
    }));
    let playback = async {
        harness.clock.advance(1_000);
        host.update_player_state(None, true, 1_000).await;
        host.update_player_state(None, true, 2_000).await;
    };
    tokio::join!(buffering, playback);

    let doc = harness.doc(&code).unwrap();
    assert_eq!(doc["position"], 2_000);
    assert_eq!(doc["isPlaying"], true);
    assert_eq!(doc["currentSong"]["id"], "t1");
    for (i, _) in guests.iter().enumerate() {
        let id = format!("G{}", i + 1);
        assert_eq!(doc["users"][&id]["isBuffering"], i % 2 == 0, "user {id}");
        assert_eq!(doc["users"][&id]["name"], format!("User {id}"));
    }
}

#[tokio::test]
async fn barrier_converges_for_many_guests() {
    let harness = Harness::new();
    let host = harness.device("H");
    let guests: Vec<_> = (1..=5).map(|i| harness.device(&format!("G{i}"))).collect();
    start_session(&harness, &host, &guests).await;

    let all: Vec<_> = std::iter::once(host.clone()).chain(guests.iter().cloned()).collect();
    join_all(all.iter().map(|d| d.update_buffering_state(true))).await;
    host.update_player_state(Some(&track("t2")), true, 0).await;
    for device in &all {
        wait_syncing(device, true).await;
    }

    // Finish in reverse join order, all at once.
    join_all(all.iter().rev().map(|d| d.update_buffering_state(false))).await;

    for device in &all {
        wait_syncing(device, false).await;
    }
}

#[tokio::test]
async fn populated_session_is_never_reaped() {
    let harness = Harness::with_config(Config {
        heartbeat_interval_secs: 3_600,
        ..Default::default()
    });
    let host = harness.device("H");
    let guest = harness.device("G");
    let code = start_session(&harness, &host, std::slice::from_ref(&guest)).await;

    harness.clock.advance(60 * 60 * 1000);
    guest.update_buffering_state(true).await;
    wait_session(&host, |s| s.any_buffering()).await;

    assert!(harness.doc(&code).is_some());
    assert!(host.is_current_user_host());
}

#[tokio::test]
async fn abandoned_host_only_session_is_reaped() {
    let harness = Harness::with_config(Config {
        heartbeat_interval_secs: 3_600,
        ..Default::default()
    });
    let bridge = Arc::new(BroadcastEventBridge::new(16));
    let mut events = bridge.subscribe();
    let host = harness.device_with_bridge("H", Some(bridge));
    let guest = harness.device("G");
    let code = start_session(&harness, &host, std::slice::from_ref(&guest)).await;

    guest.leave_session().await;
    wait_session(&host, |s| s.users.len() == 1).await;

    harness.clock.advance(10 * 60 * 1000 + 1);
    host.update_buffering_state(true).await;

    wait_state(&host, |s| *s == ConnectionState::Disconnected).await;
    assert!(harness.doc(&code).is_none());
    assert_eq!(host.ended_reason().as_deref(), Some("Session has ended"));

    let mut reaped = false;
    while let Ok(event) = events.try_recv() {
        reaped |= matches!(event, SessionEvent::Reaped { .. });
    }
    assert!(reaped);
}

#[tokio::test]
async fn rejoin_after_listener_error() {
    let harness = Harness::new();
    let host = harness.device("H");
    let guest = harness.device("G");
    let code = start_session(&harness, &host, std::slice::from_ref(&guest)).await;

    harness
        .store
        .inject_listener_error(&format!("sessions/{code}"), "network lost");
    wait_state(&guest, |s| matches!(s, ConnectionState::Error(_))).await;

    guest.join_session(&code).await.unwrap();
    wait_state(&guest, ConnectionState::is_connected).await;
    assert!(harness.doc(&code).unwrap()["users"]["G"].is_object());
}
