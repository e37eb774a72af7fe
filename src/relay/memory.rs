//! In-process relay store.
//!
//! Keeps documents and collections in memory and fans change notifications
//! out over unbounded channels. Used by headless hosts and by tests, which can
//! take the store offline or make it deliver every notification twice to
//! exercise at-least-once consumers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use super::{Entry, FieldWrite, OrderingKey, RelayStore, Subscription, WatchGuard};
use crate::error::{Error, Result};
use crate::utils::random_id;

type Watchers<T> = HashMap<String, Vec<(u64, mpsc::UnboundedSender<T>)>>;

#[derive(Default)]
struct Inner {
    docs: HashMap<String, Value>,
    collections: HashMap<String, Vec<Entry>>,
    doc_watchers: Watchers<Option<Value>>,
    collection_watchers: Watchers<Entry>,
    next_watcher: u64,
    next_seq: u64,
}

#[derive(Clone, Default)]
pub struct MemoryRelay {
    inner: Arc<Mutex<Inner>>,
    offline: Arc<AtomicBool>,
    duplicate_delivery: Arc<AtomicBool>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail with `RelayUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Sends every notification twice.
    pub fn set_duplicate_delivery(&self, enabled: bool) {
        self.duplicate_delivery.store(enabled, Ordering::SeqCst);
    }

    /// Number of live document and collection listeners.
    pub fn watcher_count(&self) -> usize {
        let inner = self.inner.lock();
        let docs: usize = inner.doc_watchers.values().map(Vec::len).sum();
        let colls: usize = inner.collection_watchers.values().map(Vec::len).sum();
        docs + colls
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(Error::RelayUnavailable("relay store is offline".into()))
        } else {
            Ok(())
        }
    }

    fn copies(&self) -> usize {
        if self.duplicate_delivery.load(Ordering::SeqCst) {
            2
        } else {
            1
        }
    }

    fn notify_document(&self, inner: &mut Inner, path: &str) {
        let snapshot = inner.docs.get(path).cloned();
        let copies = self.copies();
        if let Some(watchers) = inner.doc_watchers.get_mut(path) {
            watchers.retain(|(_, tx)| {
                (0..copies).all(|_| tx.send(snapshot.clone()).is_ok())
            });
        }
    }

    fn notify_collection(&self, inner: &mut Inner, collection: &str, entry: &Entry) {
        let copies = self.copies();
        if let Some(watchers) = inner.collection_watchers.get_mut(collection) {
            watchers.retain(|(_, tx)| (0..copies).all(|_| tx.send(entry.clone()).is_ok()));
        }
    }

    fn release_document_watcher(inner: &Arc<Mutex<Inner>>, path: String, id: u64) -> WatchGuard {
        let weak = Arc::downgrade(inner);
        WatchGuard::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.lock();
                if let Some(list) = inner.doc_watchers.get_mut(&path) {
                    list.retain(|(wid, _)| *wid != id);
                    if list.is_empty() {
                        inner.doc_watchers.remove(&path);
                    }
                }
            }
        })
    }

    fn release_collection_watcher(
        inner: &Arc<Mutex<Inner>>,
        collection: String,
        id: u64,
    ) -> WatchGuard {
        let weak = Arc::downgrade(inner);
        WatchGuard::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.lock();
                if let Some(list) = inner.collection_watchers.get_mut(&collection) {
                    list.retain(|(wid, _)| *wid != id);
                    if list.is_empty() {
                        inner.collection_watchers.remove(&collection);
                    }
                }
            }
        })
    }
}

#[async_trait]
impl RelayStore for MemoryRelay {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        self.ensure_online()?;
        Ok(self.inner.lock().docs.get(path).cloned())
    }

    async fn create(&self, path: &str, value: Value) -> Result<bool> {
        self.ensure_online()?;
        let mut inner = self.inner.lock();
        if inner.docs.contains_key(path) {
            return Ok(false);
        }
        inner.docs.insert(path.to_string(), value);
        self.notify_document(&mut inner, path);
        debug!("relay: created {path}");
        Ok(true)
    }

    async fn set_field_once(&self, path: &str, field: &str, value: Value) -> Result<FieldWrite> {
        self.ensure_online()?;
        let mut inner = self.inner.lock();
        let Some(doc) = inner.docs.get_mut(path) else {
            return Ok(FieldWrite::MissingDocument);
        };
        if !doc.is_object() {
            *doc = Value::Object(Map::new());
        }
        let Some(obj) = doc.as_object_mut() else {
            return Ok(FieldWrite::MissingDocument);
        };
        if obj.get(field).is_some_and(|v| !v.is_null()) {
            return Ok(FieldWrite::AlreadySet);
        }
        obj.insert(field.to_string(), value);
        self.notify_document(&mut inner, path);
        debug!("relay: set {path}.{field}");
        Ok(FieldWrite::Written)
    }

    async fn append(&self, collection: &str, value: Value) -> Result<Entry> {
        self.ensure_online()?;
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let entry = Entry {
            id: random_id(),
            key: OrderingKey {
                seq: inner.next_seq,
                written_at: Utc::now(),
            },
            data: value,
        };
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(entry.clone());
        self.notify_collection(&mut inner, collection, &entry);
        Ok(entry)
    }

    async fn list(&self, collection: &str) -> Result<Vec<Entry>> {
        self.ensure_online()?;
        let inner = self.inner.lock();
        let mut entries = inner.collections.get(collection).cloned().unwrap_or_default();
        entries.sort_by_key(|e| e.key);
        Ok(entries)
    }

    async fn delete_all(&self, collection: &str) -> Result<usize> {
        self.ensure_online()?;
        let mut inner = self.inner.lock();
        let removed = inner.collections.remove(collection).map_or(0, |v| v.len());
        debug!("relay: deleted {removed} entries from {collection}");
        Ok(removed)
    }

    async fn watch_document(&self, path: &str) -> Result<Subscription<Option<Value>>> {
        self.ensure_online()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = inner.next_watcher;
        inner.next_watcher += 1;
        // current snapshot first, under the same lock as registration
        let _ = tx.send(inner.docs.get(path).cloned());
        inner
            .doc_watchers
            .entry(path.to_string())
            .or_default()
            .push((id, tx));
        let guard = Self::release_document_watcher(&self.inner, path.to_string(), id);
        Ok(Subscription::new(
            UnboundedReceiverStream::new(rx).boxed(),
            guard,
        ))
    }

    async fn watch_collection(&self, collection: &str) -> Result<Subscription<Entry>> {
        self.ensure_online()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = inner.next_watcher;
        inner.next_watcher += 1;
        if let Some(existing) = inner.collections.get(collection) {
            for entry in existing {
                let _ = tx.send(entry.clone());
            }
        }
        inner
            .collection_watchers
            .entry(collection.to_string())
            .or_default()
            .push((id, tx));
        let guard = Self::release_collection_watcher(&self.inner, collection.to_string(), id);
        Ok(Subscription::new(
            UnboundedReceiverStream::new(rx).boxed(),
            guard,
        ))
    }
}
