//! Init command for establishing device identity.

use std::io::Write;

use anyhow::Result;
use nl_db::Database;

use crate::device;

/// Runs the init command.
///
/// Also seeds the sync-state row so the first push knows which device it
/// speaks for.
pub fn run<W: Write>(writer: &mut W, db: &mut Database, label: Option<&str>) -> Result<()> {
    let identity = device::init_device(label)?;
    let state = db.ensure_sync_state(&identity.device_id)?;
    tracing::debug!(?state, "sync state ready");

    writeln!(writer, "Device ID: {}", identity.device_id)?;
    writeln!(writer, "Label:     {}", identity.label)?;
    writeln!(writer, "Saved to:  {}", device::device_json_path()?.display())?;

    Ok(())
}
