use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use nl_core::{Clock, EventAmendment, SystemClock};
use tracing_subscriber::EnvFilter;

use nl_cli::commands::util::{parse_at, parse_date, parse_event_id, parse_time};
use nl_cli::commands::{
    day, edit, feed, init, nappy, pair, sleep, status, sync, timer, watch,
};
use nl_cli::device::{self, DeviceIdentity};
use nl_cli::{Cli, Commands, Config, FeedAction, SleepAction, TimerAction};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(nl_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = nl_db::Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    Ok((db, config))
}

/// Like [`open_database`], for commands that record events on this device.
fn open_for_device(
    config_path: Option<&Path>,
) -> Result<(nl_db::Database, Config, DeviceIdentity)> {
    let identity = device::require_device_identity()?;
    let (db, config) = open_database(config_path)?;
    Ok((db, config, identity))
}

#[expect(
    clippy::too_many_lines,
    reason = "CLI command dispatch is inherently verbose"
)]
fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config_path = cli.config.as_deref();
    let now = SystemClock.now();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Some(Commands::Init { label }) => {
            let (mut db, _config) = open_database(config_path)?;
            init::run(&mut out, &mut db, label.as_deref())?;
        }
        Some(Commands::Sleep(action)) => {
            let (mut db, config, identity) = open_for_device(config_path)?;
            let offset = config.offset();
            match action {
                SleepAction::Start { note, at } => {
                    let ts = parse_at(at.as_deref(), offset, now)?;
                    sleep::start(&mut out, &mut db, &identity.device_id, ts, note.as_deref(), offset)?;
                }
                SleepAction::Stop { event_id, at } => {
                    let event_id = event_id.as_deref().map(parse_event_id).transpose()?;
                    let ts = parse_at(at.as_deref(), offset, now)?;
                    sleep::stop(&mut out, &mut db, event_id, ts)?;
                }
                SleepAction::Log { start, end, note } => {
                    let span = (
                        parse_time(start, offset, now)?,
                        parse_time(end, offset, now)?,
                    );
                    sleep::log(&mut out, &mut db, &identity.device_id, span, now, note.as_deref())?;
                }
            }
        }
        Some(Commands::Nappy { kind, note, at }) => {
            let (mut db, config, identity) = open_for_device(config_path)?;
            let offset = config.offset();
            let ts = parse_at(at.as_deref(), offset, now)?;
            nappy::run(&mut out, &mut db, &identity.device_id, ts, kind, note.as_deref(), offset)?;
        }
        Some(Commands::Feed(action)) => {
            let (mut db, config, identity) = open_for_device(config_path)?;
            let offset = config.offset();
            match action {
                FeedAction::Breast { side } => {
                    feed::breast(&mut out, &mut db, &identity.device_id, now, *side, offset)?;
                }
                FeedAction::Swap { event_id, side } => {
                    let event_id = event_id.as_deref().map(parse_event_id).transpose()?;
                    feed::swap(&mut out, &mut db, event_id, now, *side)?;
                }
                FeedAction::Tick { event_id } => {
                    let event_id = event_id.as_deref().map(parse_event_id).transpose()?;
                    feed::tick(&mut out, &mut db, event_id, now)?;
                }
                FeedAction::Finish { event_id, at } => {
                    let event_id = event_id.as_deref().map(parse_event_id).transpose()?;
                    let ts = parse_at(at.as_deref(), offset, now)?;
                    feed::finish(&mut out, &mut db, event_id, ts)?;
                }
                FeedAction::Bottle { ml, note, at } => {
                    let ts = parse_at(at.as_deref(), offset, now)?;
                    feed::bottle(&mut out, &mut db, &identity.device_id, ts, *ml, note.as_deref())?;
                }
                FeedAction::Solids { amount, note, at } => {
                    let ts = parse_at(at.as_deref(), offset, now)?;
                    feed::solids(&mut out, &mut db, &identity.device_id, ts, *amount, note.as_deref())?;
                }
            }
        }
        Some(Commands::Amend {
            event_id,
            note,
            start,
            end,
            at,
            nappy_type,
            bottle_ml,
            solids,
        }) => {
            let (mut db, config) = open_database(config_path)?;
            let offset = config.offset();
            let parse = |value: &Option<String>| {
                value
                    .as_deref()
                    .map(|s| parse_time(s, offset, now))
                    .transpose()
            };
            let amendment = EventAmendment {
                note: note.clone(),
                start_ts: parse(start)?,
                end_ts: parse(end)?,
                ts: parse(at)?,
                nappy_type: nappy_type.clone(),
                bottle_amount_ml: *bottle_ml,
                solids_amount: *solids,
            };
            edit::amend(&mut out, &mut db, &parse_event_id(event_id)?, &amendment, now)?;
        }
        Some(Commands::Delete { event_id }) => {
            let (mut db, _config) = open_database(config_path)?;
            edit::delete(&mut out, &mut db, &parse_event_id(event_id)?, now)?;
        }
        Some(Commands::Day { date, json }) => {
            let (db, config) = open_database(config_path)?;
            let offset = config.offset();
            let date = match date {
                Some(date) => parse_date(date)?,
                None => nl_core::local_date(now, offset).context("current time is out of range")?,
            };
            day::run(&mut out, &db, date, offset, *json)?;
        }
        Some(Commands::Timer(action)) => {
            let (mut db, config) = open_database(config_path)?;
            let offset = config.offset();
            match action {
                TimerAction::Start {
                    kind,
                    side,
                    details,
                } => {
                    timer::start(&mut out, &mut db, *kind, now, details.as_deref(), *side, offset)?;
                }
                TimerAction::Tick => timer::tick(&mut out, &mut db, now)?,
                TimerAction::Swap { side } => timer::swap(&mut out, &mut db, now, *side)?,
                TimerAction::Status => timer::status(&mut out, &db, now, offset)?,
                TimerAction::Save => {
                    let identity = device::require_device_identity()?;
                    timer::save(&mut out, &mut db, &identity.device_id, now)?;
                }
                TimerAction::Discard => timer::discard(&mut out, &mut db)?,
            }
        }
        Some(Commands::Pair { server, code, name }) => {
            let (mut db, config) = open_database(config_path)?;
            pair::run(&mut out, &mut db, &config, server, code, name.as_deref())?;
        }
        Some(Commands::Sync) => {
            let (db, config, identity) = open_for_device(config_path)?;
            let transport = sync::transport_for(&config, &identity)?;
            sync::run(&mut out, db, transport)?;
        }
        Some(Commands::Watch) => {
            let (db, config, identity) = open_for_device(config_path)?;
            // Without a server the watcher only refreshes the timer.
            let transport = if config.server_url.is_some() || identity.server_url.is_some() {
                Some(sync::transport_for(&config, &identity)?)
            } else {
                None
            };
            watch::run(&mut out, db, &config, transport)?;
        }
        Some(Commands::Status) => {
            let (db, config) = open_database(config_path)?;
            let identity = device::load_from(&device::device_json_path()?)?;
            status::run(&mut out, &db, &config, identity.as_ref(), now)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    out.flush()?;
    Ok(())
}
