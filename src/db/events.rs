use rusqlite::params;

use super::MailDb;
use crate::envelope::EventEnvelope;

impl MailDb {
    pub fn event_hash_exists(&self, content_hash: &str) -> Result<bool, String> {
        self.conn_ref()
            .prepare("SELECT 1 FROM events WHERE content_hash = ?1 LIMIT 1")
            .and_then(|mut stmt| stmt.exists(params![content_hash]))
            .map_err(|e| format!("Failed to probe event hash: {e}"))
    }

    /// Insert a calendar event row. Events never reference a message.
    pub fn insert_event(
        &self,
        envelope: &EventEnvelope,
        source_archive: &str,
    ) -> Result<i64, String> {
        self.conn_ref()
            .execute(
                "INSERT INTO events (content_hash, source_archive, origin, title, location, starts_at, ends_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    envelope.content_hash,
                    source_archive,
                    envelope.origin,
                    envelope.title,
                    envelope.location,
                    envelope.starts_at.map(|d| d.to_rfc3339()),
                    envelope.ends_at.map(|d| d.to_rfc3339()),
                ],
            )
            .map_err(|e| format!("Failed to insert event {}: {e}", envelope.origin))?;
        Ok(self.conn_ref().last_insert_rowid())
    }

    pub fn count_events(&self) -> Result<i64, String> {
        self.conn_ref()
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .map_err(|e| format!("Failed to count events: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::test_db;
    use crate::envelope::{parse_ics_datetime, EventEnvelope};

    #[test]
    fn test_insert_event_and_probe() {
        let db = test_db();
        let env = EventEnvelope::build(
            "Renewal Call".to_string(),
            "Room 4".to_string(),
            parse_ics_datetime("20240115T100000"),
            parse_ics_datetime("20240115T110000"),
            "cal.ics::vevent:0".to_string(),
        );

        assert!(!db.event_hash_exists(&env.content_hash).expect("probe"));
        db.insert_event(&env, "cal.ics").expect("insert");
        assert!(db.event_hash_exists(&env.content_hash).expect("probe"));
        assert_eq!(db.count_events().expect("count"), 1);

        let (title, location, starts_at): (String, String, String) = db
            .conn_ref()
            .query_row(
                "SELECT title, location, starts_at FROM events LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .expect("query");
        assert_eq!(title, "Renewal Call");
        assert_eq!(location, "Room 4");
        assert!(starts_at.starts_with("2024-01-15T10:00:00"));
    }

    #[test]
    fn test_events_have_no_message_linkage() {
        let db = test_db();
        // The schema itself enforces the invariant: no message_id column.
        let has_column: bool = db
            .conn_ref()
            .prepare("SELECT message_id FROM events LIMIT 1")
            .is_ok();
        assert!(!has_column);
    }
}
