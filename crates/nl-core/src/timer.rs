//! The active-session state machine.
//!
//! At most one timed session (sleep or breastfeed) runs per device. The
//! session lives outside the journal until it is finished, so it can be
//! persisted as a single record and reconstructed after the process dies.
//!
//! ```text
//! Idle --begin--> Running --tick/swap_side--> Running --finish/discard--> Idle
//! ```
//!
//! `Idle` is the absence of a record; this module models `Running`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event_type::{BreastSide, EventType};

/// Invalid active-session transitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("a {kind} session is already running")]
    AlreadyRunning { kind: EventType },
    #[error("no session is running")]
    NotRunning,
    #[error("side swaps only apply to feed sessions, not {kind}")]
    NotFeed { kind: EventType },
    #[error("{kind} events cannot be timed")]
    Untimed { kind: EventType },
}

/// A closed breast-side interval inside a running feed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSegment {
    pub side: BreastSide,
    pub start: i64,
    pub end: i64,
}

/// The durable "currently running" record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTimer {
    pub kind: EventType,
    pub start_epoch: i64,
    /// Last observed instant, refreshed by ticks.
    pub end_epoch: i64,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Closed feed segments, oldest first.
    #[serde(default)]
    pub segments: Vec<TimerSegment>,
    /// Side of the open feed segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_side: Option<BreastSide>,
    /// Start of the open feed segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_start: Option<i64>,
}

impl ActiveTimer {
    /// Starts a session. Feeds open their first segment on `side`
    /// (left when unspecified).
    pub fn begin(
        kind: EventType,
        now: i64,
        details: Option<String>,
        side: Option<BreastSide>,
    ) -> Result<Self, TimerError> {
        let (active_side, current_start) = match kind {
            EventType::Sleep => (None, None),
            EventType::Feed => (Some(side.unwrap_or(BreastSide::Left)), Some(now)),
            EventType::Nappy => return Err(TimerError::Untimed { kind }),
        };
        Ok(Self {
            kind,
            start_epoch: now,
            end_epoch: now,
            running: true,
            details,
            segments: Vec::new(),
            active_side,
            current_start,
        })
    }

    /// Refreshes the last-observed instant. Never moves it backwards.
    pub fn tick(&mut self, now: i64) -> Result<(), TimerError> {
        if !self.running {
            return Err(TimerError::NotRunning);
        }
        self.end_epoch = self.end_epoch.max(now);
        Ok(())
    }

    /// Closes the open segment at `now` and opens one on `side`.
    pub fn swap_side(&mut self, now: i64, side: BreastSide) -> Result<(), TimerError> {
        if self.kind != EventType::Feed {
            return Err(TimerError::NotFeed { kind: self.kind });
        }
        if !self.running {
            return Err(TimerError::NotRunning);
        }
        let now = now.max(self.end_epoch);
        if let (Some(open_side), Some(open_start)) = (self.active_side, self.current_start) {
            self.segments.push(TimerSegment {
                side: open_side,
                start: open_start,
                end: now,
            });
        }
        self.active_side = Some(side);
        self.current_start = Some(now);
        self.end_epoch = now;
        Ok(())
    }

    pub const fn elapsed_s(&self) -> i64 {
        self.end_epoch - self.start_epoch
    }

    /// Every segment of the session with the open one closed at `end`.
    pub fn segments_closed_at(&self, end: i64) -> Vec<TimerSegment> {
        let mut segments = self.segments.clone();
        if let (Some(side), Some(start)) = (self.active_side, self.current_start) {
            segments.push(TimerSegment {
                side,
                start,
                end: end.max(start),
            });
        }
        segments
    }
}
