//! Account dossier and compliance timeline renderers.
//!
//! Both reports read the tagged store and write self-contained HTML files;
//! templates are embedded in the binary so the tool has no runtime asset
//! directory. Consumers wanting other formats go through `export` instead.

use std::path::{Path, PathBuf};

use crate::db::{MailDb, StoredMessage};

const DOSSIER_LIMIT: usize = 500;

/// Write an HTML dossier for one account: the most recent tagged messages,
/// newest first. Returns the output path.
pub fn make_dossier(db: &MailDb, account: &str, out_path: &Path) -> Result<PathBuf, String> {
    let messages = db.messages_for_account(account, DOSSIER_LIMIT)?;

    let mut rows = String::new();
    for m in &messages {
        rows.push_str(&format!(
            "<article class=\"msg\">\n\
             <h3>{}</h3>\n\
             <p class=\"meta\">{} — {}</p>\n\
             <pre>{}</pre>\n\
             </article>\n",
            escape(m.subject.as_deref().unwrap_or("(no subject)")),
            escape(m.sender_email.as_deref().unwrap_or("")),
            escape(m.sent_at.as_deref().unwrap_or("undated")),
            escape(&body_excerpt(m)),
        ));
    }

    let html = page(
        &format!("Dossier — {}", escape(account)),
        &format!(
            "<p>{} message(s), newest first.</p>\n{rows}",
            messages.len()
        ),
    );
    write_report(out_path, &html)?;
    Ok(out_path.to_path_buf())
}

/// Write a chronological compliance timeline for one account.
pub fn compliance_timeline(db: &MailDb, account: &str, out_path: &Path) -> Result<PathBuf, String> {
    let messages = db.account_timeline(account)?;

    let mut rows = String::new();
    for m in &messages {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            m.id,
            escape(m.sent_at.as_deref().unwrap_or("undated")),
            escape(m.sender_email.as_deref().unwrap_or("")),
            escape(m.subject.as_deref().unwrap_or("(no subject)")),
        ));
    }

    let html = page(
        &format!("Compliance timeline — {}", escape(account)),
        &format!(
            "<table>\n<tr><th>id</th><th>sent</th><th>sender</th><th>subject</th></tr>\n{rows}</table>\n\
             <p>{} message(s) in chronological order.</p>",
            messages.len()
        ),
    );
    write_report(out_path, &html)?;
    Ok(out_path.to_path_buf())
}

fn body_excerpt(m: &StoredMessage) -> String {
    let body = m.body.as_deref().unwrap_or("");
    let excerpt: String = body.chars().take(1200).collect();
    if excerpt.len() < body.len() {
        format!("{excerpt}…")
    } else {
        excerpt
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <style>\n\
         body {{ font-family: sans-serif; margin: 2rem auto; max-width: 60rem; }}\n\
         .meta {{ color: #666; }}\n\
         pre {{ white-space: pre-wrap; background: #f7f7f7; padding: 0.5rem; }}\n\
         table {{ border-collapse: collapse; width: 100%; }}\n\
         td, th {{ border: 1px solid #ccc; padding: 0.25rem 0.5rem; text-align: left; }}\n\
         </style>\n</head>\n<body>\n<h1>{title}</h1>\n{body}\n</body>\n</html>\n"
    )
}

fn write_report(out_path: &Path, html: &str) -> Result<(), String> {
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
        }
    }
    std::fs::write(out_path, html)
        .map_err(|e| format!("Failed to write {}: {e}", out_path.display()))
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::envelope::MessageEnvelope;
    use crate::tagging::{RuleKind, TagAssociation};

    fn seed_tagged(db: &MailDb, subject: &str, sent_at: &str) {
        let env = MessageEnvelope::build(
            String::new(),
            "bob@acme.com".to_string(),
            vec![],
            vec![],
            vec![],
            subject.to_string(),
            crate::envelope::parse_loose_datetime(sent_at),
            format!("body of {subject} <with markup>"),
            vec![],
            "o".to_string(),
        );
        let id = db.insert_message(&env, "a").expect("insert");
        db.insert_tag_association(
            id,
            &TagAssociation {
                account: "Acme Corp".to_string(),
                rule_kind: RuleKind::Domain,
                matched_value: "acme.com".to_string(),
            },
        )
        .expect("tag");
    }

    #[test]
    fn test_dossier_contains_tagged_messages_escaped() {
        let db = test_db();
        seed_tagged(&db, "Renewal <plan>", "2024-01-15T10:00:00Z");
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("reports/acme.html");

        let written = make_dossier(&db, "Acme Corp", &out).expect("dossier");
        let html = std::fs::read_to_string(written).expect("read");
        assert!(html.contains("Renewal &lt;plan&gt;"));
        assert!(html.contains("bob@acme.com"));
        assert!(!html.contains("<with markup>"));
    }

    #[test]
    fn test_timeline_is_chronological() {
        let db = test_db();
        seed_tagged(&db, "second", "2024-02-01T09:00:00Z");
        seed_tagged(&db, "first", "2024-01-01T09:00:00Z");
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("timeline.html");

        let written = compliance_timeline(&db, "Acme Corp", &out).expect("timeline");
        let html = std::fs::read_to_string(written).expect("read");
        let first_pos = html.find("first").expect("first row");
        let second_pos = html.find("second").expect("second row");
        assert!(first_pos < second_pos, "timeline must be oldest-first");
    }

    #[test]
    fn test_unknown_account_renders_empty_report() {
        let db = test_db();
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("empty.html");
        make_dossier(&db, "Nobody Inc", &out).expect("dossier");
        let html = std::fs::read_to_string(&out).expect("read");
        assert!(html.contains("0 message(s)"));
    }
}
