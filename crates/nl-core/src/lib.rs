//! Core domain logic for the nursery log.
//!
//! This crate contains the fundamental types and logic for:
//! - Events: sleeps, feeds and nappy changes with their temporal anchors
//! - Feed segments: per-side breastfeeding intervals
//! - The active-session state machine that survives process restarts
//! - Sleep classification, day ranges and daily statistics
//! - The JSON records exchanged with the sync server

pub mod clock;
pub mod event;
pub mod event_type;
pub mod rules;
pub mod stats;
pub mod timer;
pub mod types;
pub mod wire;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{Anchor, Event, EventAmendment, FeedSegment};
pub use event_type::{BreastSide, EventType, FeedMode};
pub use rules::{SleepClass, classify_sleep, day_range, local_date};
pub use stats::DaySummary;
pub use timer::{ActiveTimer, TimerError, TimerSegment};
pub use types::{DeviceId, EventId, ValidationError};
pub use wire::EventRecord;
