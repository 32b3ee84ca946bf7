//! Journal events and breastfeeding segments.

use serde::{Deserialize, Serialize};

use crate::event_type::{BreastSide, EventType, FeedMode};
use crate::types::{DeviceId, EventId, ValidationError};

/// The temporal anchor of an event.
///
/// An event is either an interval (sleeps) or an instant (feeds, nappies).
/// An in-progress interval has no `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anchor {
    Span { start: i64, end: Option<i64> },
    Instant { ts: i64 },
}

impl Anchor {
    /// Rebuilds an anchor from the nullable `start_ts`/`end_ts`/`ts` columns.
    ///
    /// `start_ts` wins when both shapes are present.
    pub fn from_columns(
        event_id: &str,
        start_ts: Option<i64>,
        end_ts: Option<i64>,
        ts: Option<i64>,
    ) -> Result<Self, ValidationError> {
        match (start_ts, ts) {
            (Some(start), _) => Ok(Self::Span { start, end: end_ts }),
            (None, Some(ts)) => Ok(Self::Instant { ts }),
            (None, None) => Err(ValidationError::MissingAnchor {
                event_id: event_id.to_string(),
            }),
        }
    }

    pub const fn start_ts(&self) -> Option<i64> {
        match self {
            Self::Span { start, .. } => Some(*start),
            Self::Instant { .. } => None,
        }
    }

    pub const fn end_ts(&self) -> Option<i64> {
        match self {
            Self::Span { end, .. } => *end,
            Self::Instant { .. } => None,
        }
    }

    pub const fn ts(&self) -> Option<i64> {
        match self {
            Self::Span { .. } => None,
            Self::Instant { ts } => Some(*ts),
        }
    }

    /// The ordering key: `start_ts` when present, otherwise `ts`.
    pub const fn primary_ts(&self) -> i64 {
        match self {
            Self::Span { start, .. } => *start,
            Self::Instant { ts } => *ts,
        }
    }

    pub const fn is_in_progress(&self) -> bool {
        matches!(self, Self::Span { end: None, .. })
    }
}

/// One logged care occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub device_id: DeviceId,
    pub event_type: EventType,
    pub created_ts: i64,
    pub updated_ts: i64,
    /// Optimistic-concurrency token, starts at 1.
    pub version: i64,
    /// Tombstone flag. Rows are never physically removed.
    pub deleted: bool,
    pub anchor: Anchor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_mode: Option<FeedMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottle_amount_ml: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solids_amount: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_s: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nappy_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Event {
    /// Creates a fresh version-1 event with a random id.
    pub fn new(event_type: EventType, device_id: DeviceId, now: i64, anchor: Anchor) -> Self {
        Self {
            event_id: EventId::generate(),
            device_id,
            event_type,
            created_ts: now,
            updated_ts: now,
            version: 1,
            deleted: false,
            anchor,
            feed_mode: None,
            bottle_amount_ml: None,
            solids_amount: None,
            duration_s: None,
            nappy_type: None,
            note: None,
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    pub const fn primary_ts(&self) -> i64 {
        self.anchor.primary_ts()
    }

    /// Records a local mutation: bumps `version` by exactly one.
    pub const fn touch(&mut self, now: i64) {
        self.version += 1;
        self.updated_ts = now;
    }

    /// Applies an amendment in place. Does not touch the version.
    pub fn amend(&mut self, amendment: &EventAmendment) -> Result<(), ValidationError> {
        match &mut self.anchor {
            Anchor::Span { start, end } => {
                if amendment.ts.is_some() {
                    return Err(ValidationError::AnchorMismatch {
                        event_id: self.event_id.to_string(),
                    });
                }
                let new_start = amendment.start_ts.unwrap_or(*start);
                let new_end = amendment.end_ts.or(*end);
                if let Some(new_end) = new_end {
                    if new_end < new_start {
                        return Err(ValidationError::InvalidSpan {
                            start: new_start,
                            end: new_end,
                        });
                    }
                }
                *start = new_start;
                *end = new_end;
            }
            Anchor::Instant { ts } => {
                if amendment.start_ts.is_some() || amendment.end_ts.is_some() {
                    return Err(ValidationError::AnchorMismatch {
                        event_id: self.event_id.to_string(),
                    });
                }
                if let Some(new_ts) = amendment.ts {
                    *ts = new_ts;
                }
            }
        }

        if let Some(note) = &amendment.note {
            self.note = Some(note.clone());
        }
        if let Some(nappy_type) = &amendment.nappy_type {
            self.nappy_type = Some(nappy_type.clone());
        }
        if amendment.bottle_amount_ml.is_some() {
            self.bottle_amount_ml = amendment.bottle_amount_ml;
        }
        if amendment.solids_amount.is_some() {
            self.solids_amount = amendment.solids_amount;
        }
        Ok(())
    }
}

/// A partial edit of an existing event. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventAmendment {
    pub note: Option<String>,
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
    pub ts: Option<i64>,
    pub nappy_type: Option<String>,
    pub bottle_amount_ml: Option<u32>,
    pub solids_amount: Option<u32>,
}

impl EventAmendment {
    pub const fn is_empty(&self) -> bool {
        self.note.is_none()
            && self.start_ts.is_none()
            && self.end_ts.is_none()
            && self.ts.is_none()
            && self.nappy_type.is_none()
            && self.bottle_amount_ml.is_none()
            && self.solids_amount.is_none()
    }
}

/// One contiguous interval on one breast within a breastfeeding event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSegment {
    pub id: i64,
    pub event_id: EventId,
    pub side: BreastSide,
    pub start_ts: i64,
    /// Last observed instant while open; the closing instant once closed.
    pub end_ts: i64,
    pub open: bool,
}

impl FeedSegment {
    pub const fn duration_s(&self) -> i64 {
        self.end_ts - self.start_ts
    }
}
