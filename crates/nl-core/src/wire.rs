//! JSON records exchanged with the sync server.
//!
//! The wire shape keeps the flat `start_ts`/`end_ts`/`ts` columns and moves
//! the type-specific fields into a free-form `payload` object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::{Anchor, Event};
use crate::event_type::{EventType, FeedMode};
use crate::types::{DeviceId, EventId, ValidationError};

/// An event as sent to and received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: EventId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Free-form description written by older servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
    #[serde(default)]
    pub start_ts: Option<i64>,
    #[serde(default)]
    pub end_ts: Option<i64>,
    #[serde(default)]
    pub ts: Option<i64>,
    pub created_ts: i64,
    pub updated_ts: i64,
    pub version: i64,
    #[serde(default)]
    pub deleted: bool,
    pub device_id: DeviceId,
}

impl EventRecord {
    /// Last-writer-wins ordering key: `(version, updated_ts, device_id)`.
    pub fn lww_key(&self) -> (i64, i64, &str) {
        (self.version, self.updated_ts, self.device_id.as_str())
    }

    /// Whether this record wins over `other` under last-writer-wins.
    pub fn supersedes(&self, other: &Self) -> bool {
        self.lww_key() > other.lww_key()
    }
}

impl From<&Event> for EventRecord {
    fn from(event: &Event) -> Self {
        let mut payload = Map::new();
        if let Some(mode) = event.feed_mode {
            payload.insert("mode".to_string(), Value::from(mode.as_str()));
        }
        if let Some(amount) = event.bottle_amount_ml {
            payload.insert("bottle_amount_ml".to_string(), Value::from(amount));
        }
        if let Some(amount) = event.solids_amount {
            payload.insert("solids_amount".to_string(), Value::from(amount));
        }
        if let Some(duration) = event.duration_s {
            payload.insert("duration_s".to_string(), Value::from(duration));
        }
        if let Some(nappy_type) = &event.nappy_type {
            payload.insert("nappy_type".to_string(), Value::from(nappy_type.as_str()));
        }
        if let Some(note) = &event.note {
            payload.insert("note".to_string(), Value::from(note.as_str()));
        }

        Self {
            event_id: event.event_id.clone(),
            event_type: event.event_type,
            details: None,
            payload: (!payload.is_empty()).then_some(payload),
            start_ts: event.anchor.start_ts(),
            end_ts: event.anchor.end_ts(),
            ts: event.anchor.ts(),
            created_ts: event.created_ts,
            updated_ts: event.updated_ts,
            version: event.version,
            deleted: event.deleted,
            device_id: event.device_id.clone(),
        }
    }
}

impl TryFrom<EventRecord> for Event {
    type Error = ValidationError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        let payload = record.payload.unwrap_or_default();
        let details = payload
            .get("details")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(record.details);

        let anchor = match (record.event_type, record.ts, record.start_ts) {
            // Feeds are point events; older clients only sent `start_ts`.
            (EventType::Feed, None, Some(start)) => Anchor::Instant { ts: start },
            _ => Anchor::from_columns(
                record.event_id.as_str(),
                record.start_ts,
                record.end_ts,
                record.ts,
            )?,
        };

        let (feed_mode, nappy_type) = match record.event_type {
            EventType::Feed => {
                let mode = payload
                    .get("mode")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<FeedMode>().ok())
                    .or_else(|| details.as_deref().and_then(FeedMode::from_legacy_details));
                (mode, None)
            }
            EventType::Nappy => {
                let nappy_type = payload
                    .get("nappy_type")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or(details);
                (None, nappy_type)
            }
            EventType::Sleep => (None, None),
        };

        Ok(Self {
            event_id: record.event_id,
            device_id: record.device_id,
            event_type: record.event_type,
            created_ts: record.created_ts,
            updated_ts: record.updated_ts,
            version: record.version,
            deleted: record.deleted,
            anchor,
            feed_mode,
            bottle_amount_ml: payload_u32(&payload, "bottle_amount_ml"),
            solids_amount: payload_u32(&payload, "solids_amount"),
            duration_s: payload.get("duration_s").and_then(Value::as_i64),
            nappy_type,
            note: payload
                .get("note")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Reads a non-negative amount that may arrive as a number or a string.
fn payload_u32(payload: &Map<String, Value>, key: &str) -> Option<u32> {
    match payload.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One per-record outcome of a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushResult {
    /// The server's copy after resolution (the winner).
    pub event: EventRecord,
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    pub server_clock: i64,
    pub results: Vec<PushResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub since: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    pub server_clock: i64,
    pub events: Vec<EventRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRequest {
    pub pairing_code: String,
    pub device_id: DeviceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairResponse {
    pub device_id: DeviceId,
    pub token: String,
}

impl std::fmt::Debug for PairResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairResponse")
            .field("device_id", &self.device_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
}
