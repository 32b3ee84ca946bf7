//! Server sync and background workers for the nursery log.
//!
//! - [`SyncEngine`]: the serialized push-then-pull cycle over a [`Transport`]
//! - [`HttpTransport`]: the JSON-over-HTTP transport with bearer auth
//! - [`SyncScheduler`]: periodic cycles with backoff and a force-sync trigger
//! - [`TimerRefresher`]: keeps the active session's `end_epoch` fresh
//!
//! Workers share one [`nl_db::Database`] behind a `tokio::sync::Mutex` and
//! stop when a `tokio::sync::watch` shutdown flag flips to `true`.

pub mod engine;
pub mod refresher;
pub mod scheduler;
pub mod transport;

#[cfg(test)]
mod testing;

pub use engine::{CycleOutcome, SyncEngine, SyncError, SyncReport, SyncStage};
pub use refresher::{RefresherExit, TimerRefresher};
pub use scheduler::SyncScheduler;
pub use transport::{HttpTransport, Transport, TransportError};
