//! Relay store abstraction.
//!
//! The relay store is an external document database used purely as a
//! rendezvous medium: documents addressed by slash-separated paths, and
//! append-only collections whose entries receive a store-assigned
//! [`OrderingKey`] at write time. Change notifications are delivered through
//! cancellable [`Subscription`] handles.

pub mod memory;

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use memory::MemoryRelay;

/// Totally ordered write timestamp assigned by the store.
///
/// `seq` is strictly increasing across all writers; `written_at` is the
/// wall clock at commit and only informative.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct OrderingKey {
    pub seq: u64,
    pub written_at: DateTime<Utc>,
}

impl PartialEq for OrderingKey {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for OrderingKey {}

impl Hash for OrderingKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.seq.hash(state);
    }
}

impl Ord for OrderingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seq.cmp(&other.seq)
    }
}

impl PartialOrd for OrderingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One record of an append-only collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: String,
    pub key: OrderingKey,
    pub data: Value,
}

/// Result of a single-writer-once field write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWrite {
    Written,
    AlreadySet,
    MissingDocument,
}

#[async_trait]
pub trait RelayStore: Send + Sync {
    /// Reads a document; `None` when it does not exist.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Creates a document; returns `false` if one already exists at `path`.
    async fn create(&self, path: &str, value: Value) -> Result<bool>;

    /// Sets `field` on an existing document unless it already holds a value.
    async fn set_field_once(&self, path: &str, field: &str, value: Value) -> Result<FieldWrite>;

    /// Appends to a collection, assigning an id and an ordering key.
    ///
    /// Records are passed without a `timestamp` field. A store shared with
    /// other clients must persist the key as the record's `timestamp` (its
    /// server timestamp), since those clients order and filter by that field.
    async fn append(&self, collection: &str, value: Value) -> Result<Entry>;

    /// All entries of a collection in ordering-key order.
    async fn list(&self, collection: &str) -> Result<Vec<Entry>>;

    /// Deletes every entry of a collection, returning how many were removed.
    async fn delete_all(&self, collection: &str) -> Result<usize>;

    /// Document snapshots: the current state first, then one per change.
    async fn watch_document(&self, path: &str) -> Result<Subscription<Option<Value>>>;

    /// Added entries: existing ones first, then each new append, in order.
    /// Delivery is at-least-once.
    async fn watch_collection(&self, collection: &str) -> Result<Subscription<Entry>>;
}

/// Removes a watcher from its store when the subscription ends.
pub(crate) struct WatchGuard(Option<Box<dyn FnOnce() + Send + Sync>>);

impl WatchGuard {
    pub(crate) fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self(Some(Box::new(release)))
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

/// Cancellable, ordered stream of change notifications.
///
/// Dropping the handle (or calling [`Subscription::unsubscribe`]) releases
/// the listener in the store.
pub struct Subscription<T> {
    stream: BoxStream<'static, T>,
    _guard: WatchGuard,
}

impl<T: Send + 'static> Subscription<T> {
    pub(crate) fn new(stream: BoxStream<'static, T>, guard: WatchGuard) -> Self {
        Self {
            stream,
            _guard: guard,
        }
    }

    pub async fn next(&mut self) -> Option<T> {
        self.stream.next().await
    }

    /// Transforms notifications, dropping those for which `f` returns `None`.
    /// The listener stays registered until the new handle is dropped.
    pub fn filter_map<U, F>(self, mut f: F) -> Subscription<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Option<U> + Send + 'static,
    {
        let Subscription { stream, _guard } = self;
        Subscription {
            stream: stream
                .filter_map(move |item| futures::future::ready(f(item)))
                .boxed(),
            _guard,
        }
    }

    pub fn unsubscribe(self) {}
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.stream.poll_next_unpin(cx)
    }
}

/// `webrtc_rooms/{id}`
pub fn room_path(room_id: &str) -> String {
    format!("webrtc_rooms/{room_id}")
}

/// `whiteboard_rooms/{id}/drawings`
pub fn drawings_path(room_id: &str) -> String {
    format!("whiteboard_rooms/{room_id}/drawings")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_key_orders_by_sequence_only() {
        let later_clock = Utc::now();
        let earlier_clock = later_clock - chrono::Duration::seconds(5);
        let a = OrderingKey {
            seq: 1,
            written_at: later_clock,
        };
        let b = OrderingKey {
            seq: 2,
            written_at: earlier_clock,
        };
        assert!(a < b);
    }
}
