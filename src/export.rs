//! CSV export: one file per table, for spreadsheet and downstream
//! consumption. Column order follows the schema; values are stringified
//! (blobs as hex) so every table exports uniformly.

use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;

use crate::db::MailDb;

const EXPORT_TABLES: &[&str] = &[
    "messages",
    "attachments",
    "events",
    "entities",
    "tag_associations",
];

/// Export every table to `<out_dir>/<table>.csv`. Returns the files written.
pub fn export_tables(db: &MailDb, out_dir: &Path) -> Result<Vec<PathBuf>, String> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| format!("Failed to create {}: {e}", out_dir.display()))?;

    let mut written = Vec::new();
    for table in EXPORT_TABLES {
        let out_path = out_dir.join(format!("{table}.csv"));
        export_table(db, table, &out_path)?;
        log::info!("Exported {table} -> {}", out_path.display());
        written.push(out_path);
    }
    Ok(written)
}

fn export_table(db: &MailDb, table: &str, out_path: &Path) -> Result<(), String> {
    // Table names come from the fixed list above, never from input.
    let mut stmt = db
        .conn_ref()
        .prepare(&format!("SELECT * FROM {table}"))
        .map_err(|e| format!("Failed to prepare export of {table}: {e}"))?;

    let column_names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let column_count = column_names.len();

    let mut writer = csv::Writer::from_path(out_path)
        .map_err(|e| format!("Failed to open {}: {e}", out_path.display()))?;
    writer
        .write_record(&column_names)
        .map_err(|e| format!("Failed to write header for {table}: {e}"))?;

    let mut rows = stmt
        .query([])
        .map_err(|e| format!("Failed to query {table}: {e}"))?;
    while let Some(row) = rows
        .next()
        .map_err(|e| format!("Failed to read row from {table}: {e}"))?
    {
        let mut record: Vec<String> = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let value = row
                .get_ref(i)
                .map_err(|e| format!("Failed to read column {i} of {table}: {e}"))?;
            record.push(render_value(value));
        }
        writer
            .write_record(&record)
            .map_err(|e| format!("Failed to write row for {table}: {e}"))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush {}: {e}", out_path.display()))
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).to_string(),
        ValueRef::Blob(b) => hex::encode(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::envelope::MessageEnvelope;

    #[test]
    fn test_export_writes_all_tables() {
        let db = test_db();
        let env = MessageEnvelope::build(
            String::new(),
            "bob@acme.com".to_string(),
            vec!["alice@partner.io".to_string()],
            vec![],
            vec![],
            "export me".to_string(),
            None,
            "body, with comma".to_string(),
            vec![],
            "inbox/1.eml".to_string(),
        );
        db.insert_message(&env, "archive").expect("insert");

        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("csv");
        let files = export_tables(&db, &out).expect("export");
        assert_eq!(files.len(), EXPORT_TABLES.len());

        let messages_csv = std::fs::read_to_string(out.join("messages.csv")).expect("read");
        assert!(messages_csv.lines().next().expect("header").contains("content_hash"));
        assert!(messages_csv.contains("export me"));
        // CSV quoting survives embedded commas
        assert!(messages_csv.contains("\"body, with comma\""));

        let events_csv = std::fs::read_to_string(out.join("events.csv")).expect("read");
        assert_eq!(events_csv.lines().count(), 1, "header only for empty table");
    }
}
