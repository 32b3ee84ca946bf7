//! Amend and delete commands.

use std::io::Write;

use anyhow::Result;
use nl_core::{EventAmendment, EventId};
use nl_db::Database;

pub fn amend<W: Write>(
    writer: &mut W,
    db: &mut Database,
    event_id: &EventId,
    amendment: &EventAmendment,
    now: i64,
) -> Result<()> {
    if amendment.is_empty() {
        anyhow::bail!("Nothing to change. Pass at least one field to amend.");
    }
    if !db.amend_event(event_id, amendment, now)? {
        anyhow::bail!("No event with id {event_id}");
    }
    writeln!(writer, "Amended {event_id}")?;
    Ok(())
}

pub fn delete<W: Write>(
    writer: &mut W,
    db: &mut Database,
    event_id: &EventId,
    now: i64,
) -> Result<()> {
    if !db.soft_delete(event_id, now)? {
        anyhow::bail!("No event with id {event_id}");
    }
    writeln!(writer, "Deleted {event_id}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use nl_core::DeviceId;

    use super::*;

    fn setup() -> (Database, DeviceId) {
        (
            Database::open_in_memory().unwrap(),
            DeviceId::new("phone").unwrap(),
        )
    }

    #[test]
    fn amend_updates_fields_and_version() {
        let (mut db, device) = setup();
        let id = db.log_sleep(0, 3_600, 3_600, &device, None).unwrap();
        let amendment = EventAmendment {
            end_ts: Some(5_400),
            note: Some("woke for feed".to_string()),
            ..EventAmendment::default()
        };

        amend(&mut Vec::new(), &mut db, &id, &amendment, 6_000).unwrap();

        let event = db.get_event(&id).unwrap().unwrap();
        assert_eq!(event.anchor.end_ts(), Some(5_400));
        assert_eq!(event.note.as_deref(), Some("woke for feed"));
        assert_eq!(event.version, 2);
        assert_eq!(event.updated_ts, 6_000);
    }

    #[test]
    fn empty_amendment_is_rejected() {
        let (mut db, device) = setup();
        let id = db.log_nappy(0, &device, "wet", None).unwrap();
        let err = amend(&mut Vec::new(), &mut db, &id, &EventAmendment::default(), 1).unwrap_err();
        assert!(err.to_string().contains("Nothing to change"));
        assert_eq!(db.get_event(&id).unwrap().unwrap().version, 1);
    }

    #[test]
    fn amend_unknown_event_fails() {
        let (mut db, _) = setup();
        let amendment = EventAmendment {
            note: Some("x".to_string()),
            ..EventAmendment::default()
        };
        let missing = EventId::new("missing").unwrap();
        assert!(amend(&mut Vec::new(), &mut db, &missing, &amendment, 1).is_err());
    }

    #[test]
    fn delete_leaves_tombstone() {
        let (mut db, device) = setup();
        let id = db.log_nappy(0, &device, "dirty", None).unwrap();
        let mut output = Vec::new();

        delete(&mut output, &mut db, &id, 50).unwrap();

        let event = db.get_event(&id).unwrap().unwrap();
        assert!(event.deleted);
        assert_eq!(event.version, 2);
        assert!(db.events_for_day(0, 86_399).unwrap().is_empty());
        assert_eq!(String::from_utf8(output).unwrap(), format!("Deleted {id}\n"));
    }
}
