//! In-process [`SessionStore`] with Firebase-like semantics.
//!
//! - Values form one JSON tree.
//! - Writing `null` deletes, and objects left empty are pruned.
//! - A merge applies all of its writes under one lock and notifies once.
//! - A subscriber is notified only when its own snapshot changed.
//!
//! Fault hooks ([`set_fail_writes`](InMemorySessionStore::set_fail_writes),
//! [`inject_listener_error`](InMemorySessionStore::inject_listener_error))
//! and the bounded [`StoreOperation`] log exist for tests and the simulator.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use super::{SessionStore, StoreUpdate, Subscription, SubscriptionId};
use crate::error::{StoreError, StoreResult};
use crate::protocol_constants::PATH_SEPARATOR;

/// A successful mutation, as recorded in the operation log.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOperation {
    Write { path: String, value: Value },
    Merge { path: String, updates: Map<String, Value> },
    Delete { path: String },
}

impl StoreOperation {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Write { path, .. } | Self::Merge { path, .. } | Self::Delete { path } => path,
        }
    }

    /// Relative keys touched by a merge. Empty for other operations.
    #[must_use]
    pub fn merged_keys(&self) -> Vec<&str> {
        match self {
            Self::Merge { updates, .. } => updates.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// Entries kept by the operation log of [`InMemorySessionStore::new`].
pub const DEFAULT_OPERATION_LOG_CAPACITY: usize = 1024;

struct Subscriber {
    path: Vec<String>,
    last: Option<Value>,
    tx: mpsc::UnboundedSender<StoreUpdate>,
}

/// Shared JSON tree with push subscriptions.
pub struct InMemorySessionStore {
    /// Lock order: `root` before `subscribers`.
    root: Mutex<Value>,
    subscribers: DashMap<SubscriptionId, Subscriber>,
    next_id: AtomicU64,
    fail_writes: AtomicBool,
    /// Most recent mutations, oldest first.
    operations: Mutex<VecDeque<StoreOperation>>,
    operation_capacity: usize,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::with_operation_log_capacity(DEFAULT_OPERATION_LOG_CAPACITY)
    }

    /// Keeps only the last `capacity` mutations. Zero disables the log.
    pub fn with_operation_log_capacity(capacity: usize) -> Self {
        Self {
            root: Mutex::new(Value::Object(Map::new())),
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            fail_writes: AtomicBool::new(false),
            operations: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            operation_capacity: capacity,
        }
    }

    /// Makes every subsequent write, merge and delete fail with
    /// [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delivers a listener error to every subscriber of exactly `path`.
    ///
    /// Returns how many subscribers received it.
    pub fn inject_listener_error(&self, path: &str, message: &str) -> usize {
        let Ok(target) = split_path(path) else {
            return 0;
        };

        let mut delivered = 0;
        for entry in self.subscribers.iter() {
            if entry.path == target
                && entry
                    .tx
                    .send(StoreUpdate::ListenerError(message.to_string()))
                    .is_ok()
            {
                delivered += 1;
            }
        }
        delivered
    }

    /// Synchronous read for assertions.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Value> {
        let segments = split_path(path).ok()?;
        value_at(&self.root.lock(), &segments).cloned()
    }

    /// Most recent successful mutations in the order they were applied.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.operations.lock().iter().cloned().collect()
    }

    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    /// Number of registered subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes are failing".to_string()));
        }
        Ok(())
    }

    /// Applies `apply` to the tree, prunes it and notifies subscribers, all
    /// under the tree lock so notifications follow mutation order.
    fn mutate<F>(&self, operation: StoreOperation, apply: F)
    where
        F: FnOnce(&mut Value),
    {
        let mut root = self.root.lock();
        apply(&mut *root);
        prune(&mut *root);
        self.record(operation);
        self.notify(&root);
    }

    fn record(&self, operation: StoreOperation) {
        if self.operation_capacity == 0 {
            return;
        }
        let mut operations = self.operations.lock();
        if operations.len() == self.operation_capacity {
            operations.pop_front();
        }
        operations.push_back(operation);
    }

    fn notify(&self, root: &Value) {
        self.subscribers.retain(|_, sub| !sub.tx.is_closed());

        for mut entry in self.subscribers.iter_mut() {
            let id = *entry.key();
            let sub = entry.value_mut();
            let snapshot = value_at(root, &sub.path).cloned();
            if snapshot == sub.last {
                continue;
            }
            sub.last = snapshot.clone();
            if sub.tx.send(StoreUpdate::Snapshot(snapshot)).is_err() {
                log::trace!("[SessionStore] Subscriber {} dropped", id);
            }
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn write(&self, path: &str, value: Value) -> StoreResult<()> {
        self.check_writable()?;
        let segments = split_path(path)?;
        log::trace!("[SessionStore] write {}", path);

        let operation = StoreOperation::Write {
            path: path.to_string(),
            value: value.clone(),
        };
        self.mutate(operation, |root| set_at(root, &segments, value));
        Ok(())
    }

    async fn merge_write(&self, path: &str, updates: Map<String, Value>) -> StoreResult<()> {
        self.check_writable()?;
        let base = split_path(path)?;

        // Validate every key before touching the tree.
        let mut writes = Vec::with_capacity(updates.len());
        for (key, value) in &updates {
            let mut full = base.clone();
            full.extend(split_path(key)?);
            writes.push((full, value.clone()));
        }
        log::trace!("[SessionStore] merge {} ({} keys)", path, writes.len());

        let operation = StoreOperation::Merge {
            path: path.to_string(),
            updates,
        };
        self.mutate(operation, |root| {
            for (segments, value) in writes {
                set_at(root, &segments, value);
            }
        });
        Ok(())
    }

    async fn read(&self, path: &str) -> StoreResult<Option<Value>> {
        let segments = split_path(path)?;
        Ok(value_at(&self.root.lock(), &segments).cloned())
    }

    async fn subscribe(&self, path: &str) -> StoreResult<Subscription> {
        let segments = split_path(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let root = self.root.lock();
        let snapshot = value_at(&root, &segments).cloned();
        // Receiver is alive, send cannot fail.
        let _ = tx.send(StoreUpdate::Snapshot(snapshot.clone()));
        self.subscribers.insert(
            id,
            Subscriber {
                path: segments,
                last: snapshot,
                tx,
            },
        );
        drop(root);

        log::debug!("[SessionStore] Subscription {} on {}", id, path);
        Ok(Subscription { id, updates: rx })
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        if self.subscribers.remove(&id).is_some() {
            log::debug!("[SessionStore] Subscription {} removed", id);
        }
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.check_writable()?;
        let segments = split_path(path)?;
        log::trace!("[SessionStore] delete {}", path);

        let operation = StoreOperation::Delete {
            path: path.to_string(),
        };
        self.mutate(operation, |root| set_at(root, &segments, Value::Null));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tree helpers
// ─────────────────────────────────────────────────────────────────────────────

fn split_path(path: &str) -> StoreResult<Vec<String>> {
    let trimmed = path.trim_matches(PATH_SEPARATOR);
    if trimmed.is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }

    let segments: Vec<String> = trimmed.split(PATH_SEPARATOR).map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

fn value_at<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(root, |node, segment| node.as_object()?.get(segment))
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced by an object"),
    }
}

fn set_at(root: &mut Value, segments: &[String], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut node = root;
    for segment in parents {
        node = ensure_object(node)
            .entry(segment.clone())
            .or_insert(Value::Null);
    }

    let map = ensure_object(node);
    if value.is_null() {
        map.remove(last);
    } else {
        map.insert(last.clone(), value);
    }
}

/// Drops nulls and empty objects. Returns true when `node` itself is empty.
fn prune(node: &mut Value) -> bool {
    match node {
        Value::Null => true,
        Value::Object(map) => {
            map.retain(|_, child| !prune(child));
            map.is_empty()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::error::TryRecvError;

    fn merge(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn next_snapshot(sub: &mut Subscription) -> Option<Value> {
        match sub.updates.try_recv() {
            Ok(StoreUpdate::Snapshot(value)) => value,
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_then_read() {
        let store = InMemorySessionStore::new();
        store
            .write("/sessions/1/", json!({"code": "1", "isPlaying": false}))
            .await
            .unwrap();

        let value = store.read("sessions/1").await.unwrap().unwrap();
        assert_eq!(value["isPlaying"], false);
        assert_eq!(store.read("sessions/2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn null_deletes_and_empty_parents_are_pruned() {
        let store = InMemorySessionStore::new();
        store
            .write("sessions/1", json!({"code": "1", "users": {"g": {"id": "g"}}}))
            .await
            .unwrap();

        store
            .merge_write("sessions/1", merge(&[("users/g", Value::Null)]))
            .await
            .unwrap();

        assert_eq!(store.get("sessions/1"), Some(json!({"code": "1"})));
    }

    #[tokio::test]
    async fn written_nulls_and_empty_maps_are_not_stored() {
        let store = InMemorySessionStore::new();
        store
            .write("s/1", json!({"code": "1", "currentSong": null, "users": {}}))
            .await
            .unwrap();

        assert_eq!(store.get("s/1"), Some(json!({"code": "1"})));
    }

    #[tokio::test]
    async fn subscribe_delivers_initial_snapshot() {
        let store = InMemorySessionStore::new();
        let mut absent = store.subscribe("sessions/1").await.unwrap();
        assert_eq!(next_snapshot(&mut absent), None);

        store.write("sessions/1", json!({"code": "1"})).await.unwrap();
        let mut present = store.subscribe("sessions/1").await.unwrap();
        assert_eq!(next_snapshot(&mut present), Some(json!({"code": "1"})));
    }

    #[tokio::test]
    async fn merge_notifies_once_with_all_fields() {
        let store = InMemorySessionStore::new();
        store.write("sessions/1", json!({"code": "1"})).await.unwrap();
        let mut sub = store.subscribe("sessions/1").await.unwrap();
        next_snapshot(&mut sub);

        store
            .merge_write(
                "sessions/1",
                merge(&[("isSyncing", json!(true)), ("position", json!(10))]),
            )
            .await
            .unwrap();

        let snapshot = next_snapshot(&mut sub).unwrap();
        assert_eq!(snapshot["isSyncing"], true);
        assert_eq!(snapshot["position"], 10);
        assert!(matches!(sub.updates.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn idempotent_clear_produces_no_second_notification() {
        let store = InMemorySessionStore::new();
        store
            .write("sessions/1", json!({"code": "1", "isSyncing": true}))
            .await
            .unwrap();
        let mut sub = store.subscribe("sessions/1").await.unwrap();
        next_snapshot(&mut sub);

        let clear = merge(&[("isSyncing", json!(false))]);
        store.merge_write("sessions/1", clear.clone()).await.unwrap();
        store.merge_write("sessions/1", clear).await.unwrap();

        assert_eq!(next_snapshot(&mut sub).unwrap()["isSyncing"], false);
        assert!(matches!(sub.updates.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(store.get("sessions/1/isSyncing"), Some(json!(false)));
    }

    #[tokio::test]
    async fn unrelated_writes_do_not_notify() {
        let store = InMemorySessionStore::new();
        let mut sub = store.subscribe("sessions/1").await.unwrap();
        next_snapshot(&mut sub);

        store.write("sessions/2", json!({"code": "2"})).await.unwrap();
        assert!(matches!(sub.updates.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn partitioned_concurrent_writes_all_survive() {
        let store = InMemorySessionStore::new();
        store
            .write(
                "sessions/1",
                json!({"code": "1", "users": {"h": {"isBuffering": false}, "g": {"isBuffering": false}}}),
            )
            .await
            .unwrap();

        let host = store.merge_write(
            "sessions/1",
            merge(&[("position", json!(5_000)), ("isPlaying", json!(true))]),
        );
        let guest = store.merge_write(
            "sessions/1",
            merge(&[("users/g/isBuffering", json!(true))]),
        );
        let (a, b) = tokio::join!(host, guest);
        a.unwrap();
        b.unwrap();

        let doc = store.get("sessions/1").unwrap();
        assert_eq!(doc["position"], 5_000);
        assert_eq!(doc["isPlaying"], true);
        assert_eq!(doc["users"]["g"]["isBuffering"], true);
        assert_eq!(doc["users"]["h"]["isBuffering"], false);
    }

    #[tokio::test]
    async fn delete_notifies_absent_snapshot() {
        let store = InMemorySessionStore::new();
        store.write("sessions/1", json!({"code": "1"})).await.unwrap();
        let mut sub = store.subscribe("sessions/1").await.unwrap();
        next_snapshot(&mut sub);

        store.delete("sessions/1").await.unwrap();
        assert_eq!(next_snapshot(&mut sub), None);
        assert_eq!(store.get("sessions"), None);
    }

    #[tokio::test]
    async fn failing_writes_leave_tree_untouched() {
        let store = InMemorySessionStore::new();
        store.set_fail_writes(true);

        let err = store
            .write("sessions/1", json!({"code": "1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.get("sessions/1"), None);
        assert!(store.operations().is_empty());

        store.set_fail_writes(false);
        store.write("sessions/1", json!({"code": "1"})).await.unwrap();
        assert_eq!(store.operations().len(), 1);
    }

    #[tokio::test]
    async fn invalid_paths_are_rejected() {
        let store = InMemorySessionStore::new();
        assert!(matches!(
            store.write("/", json!(1)).await,
            Err(StoreError::InvalidPath(_))
        ));
        assert!(matches!(
            store
                .merge_write("sessions/1", merge(&[("users//x", json!(1))]))
                .await,
            Err(StoreError::InvalidPath(_))
        ));
        assert!(store.operations().is_empty());
    }

    #[tokio::test]
    async fn listener_error_reaches_matching_subscribers() {
        let store = InMemorySessionStore::new();
        let mut one = store.subscribe("sessions/1").await.unwrap();
        let mut two = store.subscribe("sessions/2").await.unwrap();
        next_snapshot(&mut one);
        next_snapshot(&mut two);

        assert_eq!(store.inject_listener_error("sessions/1", "permission denied"), 1);
        assert_eq!(
            one.updates.try_recv().unwrap(),
            StoreUpdate::ListenerError("permission denied".into())
        );
        assert!(matches!(two.updates.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let store = InMemorySessionStore::new();
        let mut sub = store.subscribe("sessions/1").await.unwrap();
        next_snapshot(&mut sub);
        assert_eq!(store.subscriber_count(), 1);

        store.unsubscribe(sub.id).await;
        assert_eq!(store.subscriber_count(), 0);

        store.write("sessions/1", json!({"code": "1"})).await.unwrap();
        assert!(matches!(
            sub.updates.try_recv(),
            Err(TryRecvError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn operation_log_records_merge_keys() {
        let store = InMemorySessionStore::new();
        store
            .merge_write(
                "sessions/1",
                merge(&[("users/g/isBuffering", json!(true))]),
            )
            .await
            .unwrap();

        let ops = store.operations();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path(), "sessions/1");
        assert_eq!(ops[0].merged_keys(), vec!["users/g/isBuffering"]);

        store.clear_operations();
        assert!(store.operations().is_empty());
    }

    #[tokio::test]
    async fn operation_log_keeps_only_recent_entries() {
        let store = InMemorySessionStore::with_operation_log_capacity(3);
        for position in 0..10 {
            store
                .merge_write("sessions/1", merge(&[("position", json!(position))]))
                .await
                .unwrap();
        }

        let ops = store.operations();
        assert_eq!(ops.len(), 3);
        let positions: Vec<Value> = ops
            .iter()
            .map(|op| match op {
                StoreOperation::Merge { updates, .. } => updates["position"].clone(),
                other => panic!("unexpected operation {other:?}"),
            })
            .collect();
        assert_eq!(positions, vec![json!(7), json!(8), json!(9)]);
    }

    #[tokio::test]
    async fn disabled_operation_log_records_nothing() {
        let store = InMemorySessionStore::with_operation_log_capacity(0);
        store.write("sessions/1/code", json!("1")).await.unwrap();

        assert!(store.operations().is_empty());
        assert_eq!(store.get("sessions/1/code"), Some(json!("1")));
    }
}
