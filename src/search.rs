//! Search front end over the persisted store.
//!
//! Two modes: full-text (the FTS index the pipeline maintains) and
//! semantic (cosine ranking over stored embeddings, only meaningful when
//! ingestion ran with the semantic layer enabled). Both are read-only and
//! safe to run against a store mid-ingest.

use comfy_table::Table;
use rusqlite::params;

use crate::config::TagConfig;
use crate::db::MailDb;
use crate::embeddings::SemanticIndexer;

/// Full-text search, rendered as a table.
pub fn search(db: &MailDb, query: &str, limit: usize) -> Result<String, String> {
    let hits = db.search_messages(query, limit)?;

    let mut table = Table::new();
    table.set_header(vec!["id", "sent_at", "sender", "accounts", "subject"]);
    for hit in &hits {
        table.add_row(vec![
            hit.id.to_string(),
            hit.sent_at.clone().unwrap_or_default(),
            hit.sender_email.clone().unwrap_or_default(),
            hit.accounts.clone().unwrap_or_default(),
            truncate(hit.subject.as_deref().unwrap_or(""), 80),
        ]);
    }
    Ok(format!("Search: {query}\n{table}\n{} result(s)", hits.len()))
}

/// Semantic search, rendered as a table. Refuses politely when the
/// semantic layer is disabled in config.
pub fn semantic_search(
    db: &MailDb,
    config: &TagConfig,
    query: &str,
    k: usize,
) -> Result<String, String> {
    if !config.semantic.enabled {
        return Ok("Semantic layer disabled in config.".to_string());
    }

    let indexer = SemanticIndexer::new();
    let ranked = indexer.search(db, query, k)?;

    let mut table = Table::new();
    table.set_header(vec!["score", "sent_at", "sender", "subject"]);
    let mut shown = 0usize;
    for (message_id, score) in ranked {
        let row: Option<(Option<String>, Option<String>, Option<String>)> = db
            .conn_ref()
            .query_row(
                "SELECT sent_at, sender_email, subject FROM messages WHERE id = ?1",
                params![message_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(|e| format!("Failed to load message {message_id}: {e}"))
            .ok();
        if let Some((sent_at, sender, subject)) = row {
            table.add_row(vec![
                format!("{score:.3}"),
                sent_at.unwrap_or_default(),
                sender.unwrap_or_default(),
                truncate(subject.as_deref().unwrap_or(""), 80),
            ]);
            shown += 1;
        }
    }
    Ok(format!("Semantic results: '{query}'\n{table}\n{shown} result(s)"))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::envelope::MessageEnvelope;

    fn seed(db: &MailDb, subject: &str, body: &str) -> i64 {
        let env = MessageEnvelope::build(
            String::new(),
            "bob@acme.com".to_string(),
            vec![],
            vec![],
            vec![],
            subject.to_string(),
            None,
            body.to_string(),
            vec![],
            "o".to_string(),
        );
        db.insert_message(&env, "a").expect("insert")
    }

    #[test]
    fn test_search_renders_hits() {
        let db = test_db();
        seed(&db, "renewal forecast", "numbers inside");
        seed(&db, "unrelated", "nothing");

        let out = search(&db, "renewal", 10).expect("search");
        assert!(out.contains("renewal forecast"));
        assert!(out.contains("1 result(s)"));
    }

    #[test]
    fn test_semantic_search_respects_toggle() {
        let db = test_db();
        let disabled = TagConfig::from_yaml("{}").expect("config");
        let out = semantic_search(&db, &disabled, "anything", 5).expect("ok");
        assert!(out.contains("disabled"));

        let enabled = TagConfig::from_yaml("semantic:\n  enabled: true\n").expect("config");
        let indexer = SemanticIndexer::new();
        let id = seed(&db, "renewal", "acme renewal pricing");
        indexer.embed_and_index(&db, id, "renewal acme renewal pricing");

        let out = semantic_search(&db, &enabled, "acme renewal", 5).expect("ok");
        assert!(out.contains("renewal"));
        assert!(out.contains("1 result(s)"));
    }

    #[test]
    fn test_truncate_long_subjects() {
        let long = "x".repeat(200);
        let out = truncate(&long, 80);
        assert_eq!(out.chars().count(), 81); // 80 + ellipsis
    }
}
