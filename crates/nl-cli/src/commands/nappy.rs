//! Nappy command.

use std::io::Write;

use anyhow::Result;
use chrono::FixedOffset;
use nl_core::{DeviceId, EventId};
use nl_db::Database;

use super::util::format_clock;

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    device: &DeviceId,
    ts: i64,
    kind: &str,
    note: Option<&str>,
    offset: FixedOffset,
) -> Result<EventId> {
    if kind.trim().is_empty() {
        anyhow::bail!("Nappy type cannot be empty");
    }
    let event_id = db.log_nappy(ts, device, kind, note)?;
    writeln!(
        writer,
        "Nappy ({kind}) logged at {} ({event_id})",
        format_clock(ts, offset)
    )?;
    Ok(event_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_nappy_at_given_time() {
        let mut db = Database::open_in_memory().unwrap();
        let device = DeviceId::new("phone").unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let mut output = Vec::new();

        let id = run(&mut output, &mut db, &device, 3_600, "wet", None, utc).unwrap();

        let event = db.get_event(&id).unwrap().unwrap();
        assert_eq!(event.anchor.ts(), Some(3_600));
        assert_eq!(event.nappy_type.as_deref(), Some("wet"));
        assert_eq!(
            String::from_utf8(output).unwrap(),
            format!("Nappy (wet) logged at 01:00 ({id})\n")
        );
    }

    #[test]
    fn blank_type_is_rejected() {
        let mut db = Database::open_in_memory().unwrap();
        let device = DeviceId::new("phone").unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        assert!(run(&mut Vec::new(), &mut db, &device, 0, "  ", None, utc).is_err());
    }
}
