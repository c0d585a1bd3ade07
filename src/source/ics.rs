//! Minimal ICS reader, VEVENT only.
//!
//! Handles RFC 5545 line folding (continuation lines start with a space or
//! tab) and property parameters (`DTSTART;TZID=...:value`). Anything that
//! is not a VEVENT is ignored.

use std::path::Path;

use super::RawRecord;
use crate::envelope::RawEvent;

/// Parse every VEVENT in a file into raw event records. An unreadable file
/// produces a single corrupt marker instead of failing the archive.
pub fn events_from_file(path: &Path, origin_base: &str) -> Vec<RawRecord> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            return vec![RawRecord::Corrupt {
                origin: origin_base.to_string(),
                reason: format!("unreadable file: {e}"),
            }]
        }
    };
    let content = String::from_utf8_lossy(&bytes);
    parse_events(&content, origin_base)
}

pub fn parse_events(content: &str, origin_base: &str) -> Vec<RawRecord> {
    let lines = unfold_lines(content);

    let mut records = Vec::new();
    let mut current: Option<RawEvent> = None;
    let mut index = 0u64;

    for line in lines {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("BEGIN:VEVENT") {
            current = Some(RawEvent::default());
            continue;
        }
        if trimmed.eq_ignore_ascii_case("END:VEVENT") {
            if let Some(mut event) = current.take() {
                event.origin = format!("{}::vevent:{}", origin_base, index);
                index += 1;
                records.push(RawRecord::Event(event));
            }
            continue;
        }
        let Some(event) = current.as_mut() else {
            continue;
        };
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        // Property parameters (";TZID=...", ";VALUE=DATE") are dropped;
        // the datetime parser copes with the value forms directly.
        let name = key.split(';').next().unwrap_or(key).to_ascii_uppercase();
        match name.as_str() {
            "SUMMARY" => event.summary = unescape_text(value),
            "LOCATION" => event.location = unescape_text(value),
            "DTSTART" => event.dtstart = Some(value.trim().to_string()),
            "DTEND" => event.dtend = Some(value.trim().to_string()),
            _ => {}
        }
    }

    records
}

/// Undo RFC 5545 folding: a line starting with space or tab continues the
/// previous line.
fn unfold_lines(content: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in content.lines() {
        if raw.starts_with(' ') || raw.starts_with('\t') {
            if let Some(last) = lines.last_mut() {
                last.push_str(raw.trim_start());
            }
        } else {
            lines.push(raw.to_string());
        }
    }
    lines
}

/// Undo ICS text escaping: `\\n`, `\\,`, `\\;`, `\\\\`.
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.trim().chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(escaped) => out.push(escaped),
            None => out.push('\\'),
        }
    }
    out
}
