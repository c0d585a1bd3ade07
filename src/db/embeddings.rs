use rusqlite::params;

use super::MailDb;

impl MailDb {
    /// Store (or replace) a message's embedding vector.
    pub fn insert_embedding(
        &self,
        message_id: i64,
        dimension: usize,
        blob: &[u8],
    ) -> Result<(), String> {
        self.conn_ref()
            .execute(
                "INSERT OR REPLACE INTO message_embeddings (message_id, dimension, embedding)
                 VALUES (?1, ?2, ?3)",
                params![message_id, dimension as i64, blob],
            )
            .map_err(|e| format!("Failed to insert embedding for message {message_id}: {e}"))?;
        Ok(())
    }

    /// All stored embeddings. The semantic search scans these; archives in
    /// this tool's scale (hundreds of thousands of rows) rank in memory
    /// comfortably.
    pub fn all_embeddings(&self) -> Result<Vec<(i64, Vec<u8>)>, String> {
        let mut stmt = self
            .conn_ref()
            .prepare("SELECT message_id, embedding FROM message_embeddings")
            .map_err(|e| format!("Failed to prepare embeddings query: {e}"))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| format!("Failed to query embeddings: {e}"))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| format!("Failed to read embedding row: {e}"))?);
        }
        Ok(results)
    }

    pub fn count_embeddings(&self) -> Result<i64, String> {
        self.conn_ref()
            .query_row("SELECT COUNT(*) FROM message_embeddings", [], |row| {
                row.get(0)
            })
            .map_err(|e| format!("Failed to count embeddings: {e}"))
    }
}
