use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::relay::{Entry, OrderingKey};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// One entry of a room's drawing log.
///
/// `timestamp` is assigned by the relay store when the event is written and
/// is `None` for events that have not been committed yet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DrawingEvent {
    #[serde(rename_all = "camelCase")]
    Draw {
        last_pos: Point,
        current_pos: Point,
        color: String,
        #[serde(deserialize_with = "stroke_size")]
        size: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<OrderingKey>,
    },
    Clear {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<OrderingKey>,
    },
}

impl DrawingEvent {
    pub fn draw(last_pos: Point, current_pos: Point, color: impl Into<String>, size: f64) -> Self {
        DrawingEvent::Draw {
            last_pos,
            current_pos,
            color: color.into(),
            size,
            timestamp: None,
        }
    }

    pub fn clear() -> Self {
        DrawingEvent::Clear { timestamp: None }
    }

    pub fn timestamp(&self) -> Option<OrderingKey> {
        match self {
            DrawingEvent::Draw { timestamp, .. } | DrawingEvent::Clear { timestamp } => *timestamp,
        }
    }

    fn set_timestamp(&mut self, key: OrderingKey) {
        match self {
            DrawingEvent::Draw { timestamp, .. } | DrawingEvent::Clear { timestamp } => {
                *timestamp = Some(key)
            }
        }
    }

    /// Record payload as written to the store; the store assigns the key.
    pub fn to_record(&self) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("timestamp");
        }
        Ok(value)
    }

    /// Decodes a stored entry, taking its ordering key from the store.
    pub fn from_entry(entry: Entry) -> Result<Self> {
        let mut event: DrawingEvent = serde_json::from_value(entry.data)?;
        event.set_timestamp(entry.key);
        Ok(event)
    }
}

// Older clients wrote the brush size as the raw input string.
fn stroke_size<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(f64),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Number(n) => Ok(n),
        Size::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
