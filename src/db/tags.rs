use rusqlite::params;

use super::MailDb;
use crate::tagging::TagAssociation;

impl MailDb {
    /// Record why a tag was applied. Written in the same transaction as the
    /// message it belongs to.
    pub fn insert_tag_association(
        &self,
        message_id: i64,
        association: &TagAssociation,
    ) -> Result<(), String> {
        self.conn_ref()
            .execute(
                "INSERT INTO tag_associations (message_id, account, rule_kind, matched_value)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    message_id,
                    association.account,
                    association.rule_kind.as_str(),
                    association.matched_value
                ],
            )
            .map_err(|e| format!("Failed to insert tag for message {message_id}: {e}"))?;
        Ok(())
    }

    /// (account, rule_kind, matched_value) triples for one message.
    pub fn tags_for_message(
        &self,
        message_id: i64,
    ) -> Result<Vec<(String, String, String)>, String> {
        let mut stmt = self
            .conn_ref()
            .prepare(
                "SELECT account, rule_kind, matched_value
                 FROM tag_associations WHERE message_id = ?1 ORDER BY id",
            )
            .map_err(|e| format!("Failed to prepare tag query: {e}"))?;

        let rows = stmt
            .query_map(params![message_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(|e| format!("Failed to query tags: {e}"))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| format!("Failed to read tag row: {e}"))?);
        }
        Ok(results)
    }

    /// Number of distinct messages carrying at least one tag.
    pub fn count_tagged_messages(&self) -> Result<i64, String> {
        self.conn_ref()
            .query_row(
                "SELECT COUNT(DISTINCT message_id) FROM tag_associations",
                [],
                |row| row.get(0),
            )
            .map_err(|e| format!("Failed to count tagged messages: {e}"))
    }
}
