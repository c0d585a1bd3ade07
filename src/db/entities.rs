use rusqlite::params;

use super::MailDb;
use crate::entities::Entity;

impl MailDb {
    /// Persist extracted entities for one message, in the same transaction
    /// as the message row.
    pub fn insert_entities(&self, message_id: i64, entities: &[Entity]) -> Result<(), String> {
        for entity in entities {
            self.conn_ref()
                .execute(
                    "INSERT INTO entities (message_id, label, text, start_char, end_char)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        message_id,
                        entity.label.as_str(),
                        entity.text,
                        entity.start as i64,
                        entity.end as i64
                    ],
                )
                .map_err(|e| format!("Failed to insert entity for message {message_id}: {e}"))?;
        }
        Ok(())
    }

    pub fn count_entities(&self) -> Result<i64, String> {
        self.conn_ref()
            .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))
            .map_err(|e| format!("Failed to count entities: {e}"))
    }
}
