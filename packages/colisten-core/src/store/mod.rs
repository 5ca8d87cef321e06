//! Trait abstraction over the shared push-notifying key-value store.
//!
//! The coordinator depends on [`SessionStore`] rather than a concrete
//! backend. [`InMemorySessionStore`] is the in-process implementation used by
//! tests and the simulator.

mod memory;

pub use memory::{InMemorySessionStore, StoreOperation};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::StoreResult;

/// Identifies one live subscription.
pub type SubscriptionId = u64;

/// One notification delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreUpdate {
    /// Full value of the subscribed subtree. `None` when the subtree is absent.
    Snapshot(Option<Value>),
    /// The backend reported a listener failure. The subscription stays
    /// registered until it is removed with [`SessionStore::unsubscribe`].
    ListenerError(String),
}

/// A live subscription to one store path.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub updates: mpsc::UnboundedReceiver<StoreUpdate>,
}

/// Shared hierarchical store.
///
/// Paths are `/`-separated. Leading and trailing separators are ignored.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Replaces the value at `path`.
    ///
    /// # Arguments
    /// * `path` - Absolute store path
    /// * `value` - New value. `Value::Null` deletes the subtree.
    async fn write(&self, path: &str, value: Value) -> StoreResult<()>;

    /// Applies several writes atomically.
    ///
    /// Subscribers observe either none or all of the writes.
    ///
    /// # Arguments
    /// * `path` - Absolute base path
    /// * `updates` - Relative path to value. `Value::Null` deletes that child.
    async fn merge_write(&self, path: &str, updates: Map<String, Value>) -> StoreResult<()>;

    /// Reads the current value at `path`, `None` when absent.
    async fn read(&self, path: &str) -> StoreResult<Option<Value>>;

    /// Subscribes to the subtree at `path`.
    ///
    /// The current snapshot is delivered immediately, then one snapshot per
    /// change.
    async fn subscribe(&self, path: &str) -> StoreResult<Subscription>;

    /// Removes a subscription. Unknown ids are ignored.
    async fn unsubscribe(&self, id: SubscriptionId);

    /// Deletes the subtree at `path`.
    async fn delete(&self, path: &str) -> StoreResult<()>;
}
