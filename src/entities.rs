//! Lightweight entity extraction over message bodies.
//!
//! Pattern-based only — addresses, dates, money amounts. The spans feed
//! the compliance reports; there is deliberately no model-backed NER here,
//! since the tool must run with no network and no model downloads.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityLabel {
    Email,
    Date,
    Money,
}

impl EntityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityLabel::Email => "EMAIL",
            EntityLabel::Date => "DATE",
            EntityLabel::Money => "MONEY",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub label: EntityLabel,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("static regex")
    })
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4})\b").expect("static regex")
    })
}

fn money_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\s?\d{1,3}(,\d{3})*(\.\d{2})?\b").expect("static regex"))
}

/// Extract all pattern entities from a body text, in label order
/// (emails, dates, money) and left-to-right within each label.
pub fn extract_entities(text: &str) -> Vec<Entity> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut entities = Vec::new();
    for (regex, label) in [
        (email_re(), EntityLabel::Email),
        (date_re(), EntityLabel::Date),
        (money_re(), EntityLabel::Money),
    ] {
        for m in regex.find_iter(text) {
            entities.push(Entity {
                label,
                text: m.as_str().to_string(),
                start: m.start(),
                end: m.end(),
            });
        }
    }
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_all_three_labels() {
        let text = "Wire $12,500.00 to carol@acme.com by 2024-02-01 or 3/15/24.";
        let entities = extract_entities(text);

        let emails: Vec<&str> = entities
            .iter()
            .filter(|e| e.label == EntityLabel::Email)
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(emails, vec!["carol@acme.com"]);

        let dates: Vec<&str> = entities
            .iter()
            .filter(|e| e.label == EntityLabel::Date)
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(dates, vec!["2024-02-01", "3/15/24"]);

        let money: Vec<&str> = entities
            .iter()
            .filter(|e| e.label == EntityLabel::Money)
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(money, vec!["$12,500.00"]);
    }

    #[test]
    fn test_spans_point_into_text() {
        let text = "contact bob@acme.com now";
        let entities = extract_entities(text);
        assert_eq!(entities.len(), 1);
        assert_eq!(&text[entities[0].start..entities[0].end], "bob@acme.com");
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(extract_entities("").is_empty());
    }
}
