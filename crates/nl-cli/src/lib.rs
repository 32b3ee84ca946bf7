//! Nursery log CLI library.
//!
//! This crate provides the CLI interface for the nursery log.

mod cli;
pub mod commands;
mod config;
pub mod device;

pub use cli::{Cli, Commands, FeedAction, SleepAction, TimerAction};
pub use config::Config;
