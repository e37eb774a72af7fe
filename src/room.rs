//! Session records in the relay store.
//!
//! A record lives at `webrtc_rooms/{id}` and carries at most one offer and at
//! most one answer, each written exactly once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::peer::types::{SdpType, SessionDescription};
use crate::relay::{room_path, FieldWrite, RelayStore, Subscription};
use crate::utils::{normalize_room_id, random_room_id};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<SessionDescription>,
}

impl SessionRecord {
    fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Clone)]
pub struct RoomRegistry {
    store: Arc<dyn RelayStore>,
    id_len: usize,
    attempts: u32,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn RelayStore>, config: &AppConfig) -> Self {
        Self {
            store,
            id_len: config.room_id_len,
            attempts: config.room_id_attempts,
        }
    }

    pub fn store(&self) -> &Arc<dyn RelayStore> {
        &self.store
    }

    /// Allocates an empty session record and returns its id.
    pub async fn create(&self) -> Result<String> {
        for _ in 0..self.attempts {
            let id = random_room_id(self.id_len);
            if self
                .store
                .create(&room_path(&id), Value::Object(Default::default()))
                .await?
            {
                info!("Created room {id}");
                return Ok(id);
            }
            debug!("Room id {id} already taken, retrying");
        }
        Err(Error::RelayUnavailable(format!(
            "could not allocate a free room id after {} attempts",
            self.attempts
        )))
    }

    /// Fetches a joinable session: the record must exist and carry an offer.
    pub async fn lookup(&self, id: &str) -> Result<SessionRecord> {
        let id = normalize_room_id(id)?;
        let Some(raw) = self.store.get(&room_path(&id)).await? else {
            return Err(Error::InvalidRoom(id));
        };
        let record = SessionRecord::from_value(raw).map_err(|e| {
            warn!("Room {id} has a malformed record: {e}");
            Error::InvalidRoom(id.clone())
        })?;
        if record.offer.is_none() {
            return Err(Error::InvalidRoom(id));
        }
        Ok(record)
    }

    pub async fn publish_offer(&self, id: &str, offer: &SessionDescription) -> Result<()> {
        self.publish(id, "offer", SdpType::Offer, offer).await
    }

    /// Writes the answer unless another responder already did.
    pub async fn publish_answer(&self, id: &str, answer: &SessionDescription) -> Result<()> {
        self.publish(id, "answer", SdpType::Answer, answer).await
    }

    async fn publish(
        &self,
        id: &str,
        field: &str,
        expected: SdpType,
        desc: &SessionDescription,
    ) -> Result<()> {
        if desc.kind != expected {
            return Err(Error::Negotiation(format!(
                "refusing to publish {:?} description as {field}",
                desc.kind
            )));
        }
        let value = serde_json::to_value(desc)?;
        match self.store.set_field_once(&room_path(id), field, value).await? {
            FieldWrite::Written => Ok(()),
            FieldWrite::AlreadySet => Err(Error::RoomOccupied(id.to_string())),
            FieldWrite::MissingDocument => Err(Error::InvalidRoom(id.to_string())),
        }
    }

    /// Record snapshots, current state first. Malformed or deleted snapshots
    /// are skipped.
    pub async fn watch(&self, id: &str) -> Result<Subscription<SessionRecord>> {
        let sub = self.store.watch_document(&room_path(id)).await?;
        let id = id.to_string();
        Ok(sub.filter_map(move |snapshot| {
            let raw = snapshot?;
            match SessionRecord::from_value(raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Ignoring malformed snapshot of room {id}: {e}");
                    None
                }
            }
        }))
    }
}
