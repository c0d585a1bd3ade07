use rusqlite::params;

use super::MailDb;
use crate::envelope::{AttachmentMeta, MessageEnvelope};

/// A persisted message row as read back for reports and export.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: i64,
    pub content_hash: String,
    pub source_archive: String,
    pub origin: Option<String>,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub recipients_to: Option<String>,
    pub recipients_cc: Option<String>,
    pub recipients_bcc: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub sent_at: Option<String>,
    pub has_attachments: bool,
}

/// A full-text search result with the accounts it resolved to.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: i64,
    pub sent_at: Option<String>,
    pub sender_email: Option<String>,
    pub subject: Option<String>,
    pub accounts: Option<String>,
}

const MESSAGE_COLUMNS: &str = "id, content_hash, source_archive, origin, sender_name, \
     sender_email, recipients_to, recipients_cc, recipients_bcc, subject, body, sent_at, \
     has_attachments";

impl MailDb {
    /// Dedup probe: is this content hash already stored?
    pub fn message_hash_exists(&self, content_hash: &str) -> Result<bool, String> {
        self.conn_ref()
            .prepare("SELECT 1 FROM messages WHERE content_hash = ?1 LIMIT 1")
            .and_then(|mut stmt| stmt.exists(params![content_hash]))
            .map_err(|e| format!("Failed to probe message hash: {e}"))
    }

    /// Insert a message row. The caller has already checked the dedup
    /// probe inside the same transaction; the UNIQUE index on content_hash
    /// is the invariant's backstop.
    pub fn insert_message(
        &self,
        envelope: &MessageEnvelope,
        source_archive: &str,
    ) -> Result<i64, String> {
        self.conn_ref()
            .execute(
                "INSERT INTO messages (
                    content_hash, source_archive, origin, sender_name, sender_email,
                    recipients_to, recipients_cc, recipients_bcc, subject, body,
                    sent_at, has_attachments
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    envelope.content_hash,
                    source_archive,
                    envelope.origin,
                    envelope.sender_name,
                    envelope.sender_email,
                    envelope.to.join(";"),
                    envelope.cc.join(";"),
                    envelope.bcc.join(";"),
                    envelope.subject,
                    envelope.body,
                    envelope.sent_at.map(|d| d.to_rfc3339()),
                    !envelope.attachments.is_empty() as i32,
                ],
            )
            .map_err(|e| format!("Failed to insert message {}: {e}", envelope.origin))?;
        Ok(self.conn_ref().last_insert_rowid())
    }

    pub fn insert_attachment(
        &self,
        message_id: i64,
        attachment: &AttachmentMeta,
    ) -> Result<(), String> {
        self.conn_ref()
            .execute(
                "INSERT INTO attachments (message_id, name, mime_type, size)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    message_id,
                    attachment.name,
                    attachment.mime_type,
                    attachment.size
                ],
            )
            .map_err(|e| format!("Failed to insert attachment for message {message_id}: {e}"))?;
        Ok(())
    }

    pub fn count_messages(&self) -> Result<i64, String> {
        self.conn_ref()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .map_err(|e| format!("Failed to count messages: {e}"))
    }

    /// Full-text search over subject+body. The query is wrapped as an FTS
    /// phrase so user input never hits MATCH syntax errors.
    pub fn search_messages(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, String> {
        let phrase = format!("\"{}\"", query.replace('"', "\"\""));
        let mut stmt = self
            .conn_ref()
            .prepare(
                "SELECT m.id, m.sent_at, m.sender_email, m.subject,
                        (SELECT group_concat(DISTINCT account)
                         FROM tag_associations t WHERE t.message_id = m.id)
                 FROM messages_fts f
                 JOIN messages m ON m.id = f.rowid
                 WHERE messages_fts MATCH ?1
                 ORDER BY m.sent_at DESC
                 LIMIT ?2",
            )
            .map_err(|e| format!("Failed to prepare search query: {e}"))?;

        let rows = stmt
            .query_map(params![phrase, limit as i64], |row| {
                Ok(SearchHit {
                    id: row.get(0)?,
                    sent_at: row.get(1)?,
                    sender_email: row.get(2)?,
                    subject: row.get(3)?,
                    accounts: row.get(4)?,
                })
            })
            .map_err(|e| format!("Failed to run search query: {e}"))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| format!("Failed to read search row: {e}"))?);
        }
        Ok(results)
    }

    /// Messages tagged to an account, newest first. Feeds the dossier.
    pub fn messages_for_account(
        &self,
        account: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, String> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE id IN (SELECT message_id FROM tag_associations WHERE account = ?1)
             ORDER BY sent_at DESC
             LIMIT ?2"
        );
        let mut stmt = self
            .conn_ref()
            .prepare(&sql)
            .map_err(|e| format!("Failed to prepare account messages query: {e}"))?;

        let rows = stmt
            .query_map(params![account, limit as i64], map_message_row)
            .map_err(|e| format!("Failed to query account messages: {e}"))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| format!("Failed to read message row: {e}"))?);
        }
        Ok(results)
    }

    /// Messages tagged to an account in chronological order. Feeds the
    /// compliance timeline.
    pub fn account_timeline(&self, account: &str) -> Result<Vec<StoredMessage>, String> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE id IN (SELECT message_id FROM tag_associations WHERE account = ?1)
             ORDER BY sent_at ASC, id ASC"
        );
        let mut stmt = self
            .conn_ref()
            .prepare(&sql)
            .map_err(|e| format!("Failed to prepare timeline query: {e}"))?;

        let rows = stmt
            .query_map(params![account], map_message_row)
            .map_err(|e| format!("Failed to query timeline: {e}"))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| format!("Failed to read timeline row: {e}"))?);
        }
        Ok(results)
    }
}

fn map_message_row(row: &rusqlite::Row) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        id: row.get(0)?,
        content_hash: row.get(1)?,
        source_archive: row.get(2)?,
        origin: row.get(3)?,
        sender_name: row.get(4)?,
        sender_email: row.get(5)?,
        recipients_to: row.get(6)?,
        recipients_cc: row.get(7)?,
        recipients_bcc: row.get(8)?,
        subject: row.get(9)?,
        body: row.get(10)?,
        sent_at: row.get(11)?,
        has_attachments: row.get::<_, i32>(12)? != 0,
    })
}
