//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nl_core::{BreastSide, EventType};

/// Offline-first nursery log.
///
/// Records sleeps, feeds and nappy changes on this device and reconciles
/// them with a self-hosted sync server when one is paired.
#[derive(Debug, Parser)]
#[command(name = "nl", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Initialize this device's identity.
    Init {
        /// Human-friendly label for this device (defaults to hostname).
        #[arg(long)]
        label: Option<String>,
    },

    /// Record sleeps.
    #[command(subcommand)]
    Sleep(SleepAction),

    /// Record a nappy change.
    Nappy {
        /// Nappy contents (e.g., wet, dirty, mixed).
        kind: String,

        #[arg(long)]
        note: Option<String>,

        /// When it happened: RFC 3339 or local HH:MM (defaults to now).
        #[arg(long)]
        at: Option<String>,
    },

    /// Record feeds.
    #[command(subcommand)]
    Feed(FeedAction),

    /// Edit a recorded event.
    Amend {
        event_id: String,

        #[arg(long)]
        note: Option<String>,

        /// New sleep start: RFC 3339 or local HH:MM.
        #[arg(long)]
        start: Option<String>,

        /// New sleep end: RFC 3339 or local HH:MM.
        #[arg(long)]
        end: Option<String>,

        /// New instant for feeds and nappies: RFC 3339 or local HH:MM.
        #[arg(long)]
        at: Option<String>,

        #[arg(long)]
        nappy_type: Option<String>,

        #[arg(long)]
        bottle_ml: Option<u32>,

        #[arg(long)]
        solids: Option<u32>,
    },

    /// Delete a recorded event.
    Delete { event_id: String },

    /// Show one day's events and totals.
    Day {
        /// Local date as YYYY-MM-DD (defaults to today).
        #[arg(long)]
        date: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Drive the durable active-session timer.
    #[command(subcommand)]
    Timer(TimerAction),

    /// Pair this device with a sync server.
    Pair {
        /// Base URL of the server (e.g., http://nas.local:8000).
        #[arg(long)]
        server: String,

        /// One-time pairing code shown by the server.
        #[arg(long)]
        code: String,

        /// Name to register the device under (defaults to its label).
        #[arg(long)]
        name: Option<String>,
    },

    /// Run one push-then-pull sync cycle.
    Sync,

    /// Keep the active timer fresh and sync in the background until Ctrl-C.
    Watch,

    /// Show device, sync and timer status.
    Status,
}

#[derive(Debug, Subcommand)]
pub enum SleepAction {
    /// Start an open-ended sleep.
    Start {
        #[arg(long)]
        note: Option<String>,

        #[arg(long)]
        at: Option<String>,
    },

    /// End a sleep (defaults to the most recent open one).
    Stop {
        event_id: Option<String>,

        #[arg(long)]
        at: Option<String>,
    },

    /// Record a sleep that already ended.
    Log {
        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum FeedAction {
    /// Start a breastfeed on one side.
    Breast {
        #[arg(long, default_value = "left")]
        side: BreastSide,
    },

    /// Switch sides on a breastfeed (defaults to the most recent one).
    Swap {
        event_id: Option<String>,

        /// Side to switch to (defaults to the other side).
        #[arg(long)]
        side: Option<BreastSide>,
    },

    /// Record progress on the open side of a breastfeed.
    Tick { event_id: Option<String> },

    /// Finish a breastfeed (defaults to the most recent one).
    Finish {
        event_id: Option<String>,

        #[arg(long)]
        at: Option<String>,
    },

    /// Record a bottle feed.
    Bottle {
        /// Amount in millilitres.
        ml: u32,

        #[arg(long)]
        note: Option<String>,

        #[arg(long)]
        at: Option<String>,
    },

    /// Record a solids feed.
    Solids {
        /// Amount eaten, in whatever unit the household uses.
        amount: u32,

        #[arg(long)]
        note: Option<String>,

        #[arg(long)]
        at: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum TimerAction {
    /// Start a sleep or feed session.
    Start {
        /// Session kind: sleep or feed.
        kind: EventType,

        /// First breast side for feed sessions.
        #[arg(long)]
        side: Option<BreastSide>,

        /// Free-form details saved as the event note.
        #[arg(long)]
        details: Option<String>,
    },

    /// Refresh the session's last observed instant.
    Tick,

    /// Switch breast sides in a feed session.
    Swap {
        /// Side to switch to (defaults to the other side).
        #[arg(long)]
        side: Option<BreastSide>,
    },

    /// Show the running session.
    Status,

    /// Save the running session into the journal.
    Save,

    /// Drop the running session without saving it.
    Discard,
}
