//! Ordered drawing log of one room, stored at
//! `whiteboard_rooms/{id}/drawings`.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::Result;
use crate::relay::{drawings_path, Entry, OrderingKey, RelayStore, Subscription};
use crate::whiteboard::event::DrawingEvent;

#[derive(Clone)]
pub struct WhiteboardLog {
    store: Arc<dyn RelayStore>,
    collection: String,
}

impl WhiteboardLog {
    pub fn new(store: Arc<dyn RelayStore>, room_id: &str) -> Self {
        Self {
            store,
            collection: drawings_path(room_id),
        }
    }

    /// Best-effort write. A failure is logged and the event dropped.
    pub async fn append(&self, event: &DrawingEvent) -> bool {
        match self.try_append(event).await {
            Ok(_) => true,
            Err(e) => {
                error!("Error saving drawing: {e}");
                false
            }
        }
    }

    pub async fn try_append(&self, event: &DrawingEvent) -> Result<OrderingKey> {
        let entry = self.store.append(&self.collection, event.to_record()?).await?;
        Ok(entry.key)
    }

    /// Full history in timestamp order.
    pub async fn read_all(&self) -> Result<Vec<DrawingEvent>> {
        let entries = self.store.list(&self.collection).await?;
        Ok(entries.into_iter().filter_map(decode).collect())
    }

    /// Events committed after `after`, in order, each delivered once.
    pub async fn subscribe(&self, after: Option<OrderingKey>) -> Result<Subscription<DrawingEvent>> {
        let sub = self.store.watch_collection(&self.collection).await?;
        let mut last = after;
        Ok(sub.filter_map(move |entry| {
            if last.is_some_and(|seen| entry.key <= seen) {
                return None;
            }
            last = Some(entry.key);
            decode(entry)
        }))
    }

    /// Deletes the history, then appends a `Clear` marker.
    ///
    /// The two steps are not atomic: a reader in between sees an empty log
    /// without a marker, and draws committed by another client between the
    /// steps are lost.
    pub async fn clear(&self) -> Result<()> {
        let removed = self.store.delete_all(&self.collection).await?;
        debug!("Cleared {removed} drawing events");
        self.try_append(&DrawingEvent::clear()).await?;
        Ok(())
    }
}

fn decode(entry: Entry) -> Option<DrawingEvent> {
    let id = entry.id.clone();
    match DrawingEvent::from_entry(entry) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Skipping malformed drawing event {id}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::MemoryRelay;
    use crate::whiteboard::event::Point;
    use serde_json::json;
    use std::time::Duration;

    fn log(relay: &MemoryRelay) -> WhiteboardLog {
        WhiteboardLog::new(Arc::new(relay.clone()), "room01")
    }

    fn seg(x: f64) -> DrawingEvent {
        DrawingEvent::draw(Point::new(x, 0.0), Point::new(x + 1.0, 0.0), "red", 4.0)
    }

    #[tokio::test]
    async fn read_all_returns_events_in_commit_order() {
        let relay = MemoryRelay::new();
        let board = log(&relay);
        for x in [1.0, 2.0, 3.0] {
            assert!(board.append(&seg(x)).await);
        }
        let all = board.read_all().await.unwrap();
        assert_eq!(all.len(), 3);
        let keys: Vec<_> = all.iter().map(|e| e.timestamp().unwrap()).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn append_failure_is_swallowed() {
        let relay = MemoryRelay::new();
        relay.set_offline(true);
        assert!(!log(&relay).append(&seg(1.0)).await);
    }

    #[tokio::test]
    async fn subscribe_skips_history_and_duplicates() {
        let relay = MemoryRelay::new();
        relay.set_duplicate_delivery(true);
        let board = log(&relay);
        let seen = board.try_append(&seg(1.0)).await.unwrap();

        let mut sub = board.subscribe(Some(seen)).await.unwrap();
        board.append(&seg(2.0)).await;
        board.append(&seg(3.0)).await;

        let a = sub.next().await.unwrap();
        let b = sub.next().await.unwrap();
        assert!(matches!(a, DrawingEvent::Draw { last_pos, .. } if last_pos.x == 2.0));
        assert!(matches!(b, DrawingEvent::Draw { last_pos, .. } if last_pos.x == 3.0));
        let more = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
        assert!(more.is_err());
    }

    #[tokio::test]
    async fn clear_leaves_only_the_marker() {
        let relay = MemoryRelay::new();
        let board = log(&relay);
        board.append(&seg(1.0)).await;
        board.append(&seg(2.0)).await;
        board.clear().await.unwrap();
        let all = board.read_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(matches!(all[0], DrawingEvent::Clear { timestamp: Some(_) }));
    }

    #[tokio::test]
    async fn malformed_entries_are_skipped() {
        let relay = MemoryRelay::new();
        let board = log(&relay);
        relay
            .append(&drawings_path("room01"), json!({ "type": "smudge" }))
            .await
            .unwrap();
        board.append(&seg(1.0)).await;
        assert_eq!(board.read_all().await.unwrap().len(), 1);
    }
}
