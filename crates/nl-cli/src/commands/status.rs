//! Status command for showing device, sync and timer state.

use std::io::Write;

use anyhow::Result;
use nl_db::Database;

use super::timer::write_timer;
use super::util::format_clock;
use crate::Config;
use crate::device::DeviceIdentity;

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    identity: Option<&DeviceIdentity>,
    now: i64,
) -> Result<()> {
    let offset = config.offset();
    let state = db.sync_state()?;

    writeln!(writer, "Nursery log status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;
    match identity {
        Some(identity) => writeln!(writer, "Device:   {} ({})", identity.label, identity.device_id)?,
        None => writeln!(writer, "Device:   not initialized (run 'nl init')")?,
    }

    let server = config
        .server_url
        .as_deref()
        .or_else(|| identity.and_then(|identity| identity.server_url.as_deref()));
    match (server, state.paired) {
        (Some(server), true) => writeln!(writer, "Server:   {server} (paired)")?,
        (Some(server), false) => writeln!(writer, "Server:   {server} (not paired)")?,
        (None, _) => writeln!(writer, "Server:   none")?,
    }
    writeln!(writer, "Synced up to server clock {}", state.last_server_clock)?;
    writeln!(writer, "Pending:  {} change(s) to push", db.count_unsynced()?)?;

    match db.active_timer()? {
        Some(timer) => write_timer(writer, &timer, now, offset)?,
        None => writeln!(writer, "No timer running.")?,
    }
    for sleep in db.open_sleeps()? {
        writeln!(
            writer,
            "Sleeping since {} ({})",
            format_clock(sleep.primary_ts(), offset),
            sleep.event_id
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use insta::assert_snapshot;
    use nl_core::{DeviceId, EventType};

    use super::*;

    fn config() -> Config {
        Config {
            database_path: PathBuf::from("/data/nl/nl.db"),
            utc_offset_minutes: Some(0),
            ..Config::default()
        }
    }

    #[test]
    fn status_before_init() {
        let db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        run(&mut output, &db, &config(), None, 0).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
Nursery log status
Database: /data/nl/nl.db
Device:   not initialized (run 'nl init')
Server:   none
Synced up to server clock 0
Pending:  0 change(s) to push
No timer running.
");
    }

    #[test]
    fn status_shows_pending_changes_and_timer() {
        let mut db = Database::open_in_memory().unwrap();
        let device = DeviceId::new("device-1").unwrap();
        db.mark_paired(&device).unwrap();
        db.log_nappy(60, &device, "wet", None).unwrap();
        db.begin_timer(EventType::Sleep, 3_600, None, None).unwrap();
        let identity = DeviceIdentity {
            device_id: device,
            label: "nursery-phone".to_string(),
            server_url: Some("http://nas:8000".to_string()),
            token: Some("secret".to_string()),
        };

        let mut output = Vec::new();
        run(&mut output, &db, &config(), Some(&identity), 3_600 + 25 * 60).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
Nursery log status
Database: /data/nl/nl.db
Device:   nursery-phone (device-1)
Server:   http://nas:8000 (paired)
Synced up to server clock 0
Pending:  1 change(s) to push
sleep timer running since 01:00 (25m)
");
    }
}
