//! Canonical record shapes and normalization.
//!
//! Every source format is reduced to one of two envelope shapes before it
//! touches the store: a message or a calendar event. The envelope carries a
//! `content_hash` computed over a canonical byte serialization of the
//! normalized identity fields, so the same logical message recovered from a
//! PST and from an exported eml hashes identically and dedups to one row.
//!
//! Normalization is tolerant by design: a missing `From` header becomes an
//! empty string, an unparsable timestamp becomes `None`. A record only
//! fails normalization when the bytes are not a message at all.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use mail_parser::{Address, MessageParser, MimeHeaders};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Attachment metadata. Blob content is intentionally not retained.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentMeta {
    pub name: String,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct MessageEnvelope {
    pub sender_name: String,
    /// Lowercased address; empty string when the header is absent.
    pub sender_email: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub body: String,
    pub attachments: Vec<AttachmentMeta>,
    /// Where inside the archive this record came from, e.g. `inbox/0012.eml`
    /// or `all.mbox::msg:41`.
    pub origin: String,
    pub content_hash: String,
}

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub title: String,
    pub location: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub origin: String,
    pub content_hash: String,
}

#[derive(Debug, Clone)]
pub enum Envelope {
    Message(MessageEnvelope),
    Event(EventEnvelope),
}

/// A message already reduced to fields by a format-specific converter
/// (Outlook-for-Mac XML) rather than parsed from RFC 5322 bytes.
#[derive(Debug, Clone, Default)]
pub struct FieldedMessage {
    pub sender_name: String,
    pub sender_email: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub sent_at_raw: Option<String>,
    pub attachments: Vec<AttachmentMeta>,
    pub origin: String,
}

/// A VEVENT as read from an ICS file, values still raw.
#[derive(Debug, Clone, Default)]
pub struct RawEvent {
    pub summary: String,
    pub location: String,
    pub dtstart: Option<String>,
    pub dtend: Option<String>,
    pub origin: String,
}

impl MessageEnvelope {
    /// Build the envelope from already-extracted fields, normalizing and
    /// computing the content hash. All constructors funnel through here so
    /// the hash is computed exactly one way.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        sender_name: String,
        sender_email: String,
        to: Vec<String>,
        cc: Vec<String>,
        bcc: Vec<String>,
        subject: String,
        sent_at: Option<DateTime<Utc>>,
        body: String,
        attachments: Vec<AttachmentMeta>,
        origin: String,
    ) -> Self {
        let sender_email = normalize_address(&sender_email);
        let to = normalize_addresses(to);
        let cc = normalize_addresses(cc);
        let bcc = normalize_addresses(bcc);
        let subject = subject.trim().to_string();

        let mut recipients: Vec<String> = Vec::new();
        recipients.extend(to.iter().cloned());
        recipients.extend(cc.iter().cloned());
        recipients.extend(bcc.iter().cloned());

        let content_hash = message_content_hash(
            &normalize_text(&subject),
            &sender_email,
            &recipients,
            &normalize_text(&body),
        );

        Self {
            sender_name: sender_name.trim().to_string(),
            sender_email,
            to,
            cc,
            bcc,
            subject,
            sent_at,
            body,
            attachments,
            origin,
            content_hash,
        }
    }

    /// All recipients in to/cc/bcc order. Used by the tagging engine.
    pub fn recipients(&self) -> impl Iterator<Item = &String> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }

    /// The text handed to the semantic layer: subject plus the head of the
    /// body, bounded so huge messages do not blow up the index.
    pub fn semantic_text(&self) -> String {
        let head: String = self.body.chars().take(2000).collect();
        format!("{}\n{}", self.subject, head)
    }
}

impl EventEnvelope {
    pub fn build(
        title: String,
        location: String,
        starts_at: Option<DateTime<Utc>>,
        ends_at: Option<DateTime<Utc>>,
        origin: String,
    ) -> Self {
        let title = title.trim().to_string();
        let location = location.trim().to_string();
        let content_hash = event_content_hash(
            &normalize_text(&title),
            &normalize_text(&location),
            starts_at,
            ends_at,
        );
        Self {
            title,
            location,
            starts_at,
            ends_at,
            origin,
            content_hash,
        }
    }
}

/// Parse RFC 5322 message bytes into an envelope. Returns `None` only when
/// the bytes cannot be interpreted as a message at all; individual missing
/// or malformed headers degrade to empty fields instead.
pub fn normalize_mail(raw: &[u8], origin: &str) -> Option<MessageEnvelope> {
    let message = MessageParser::default().parse(raw)?;

    let (sender_name, sender_email) = message
        .from()
        .and_then(first_addr)
        .unwrap_or_default();

    let to = collect_addrs(message.to());
    let cc = collect_addrs(message.cc());
    let bcc = collect_addrs(message.bcc());

    let subject = message.subject().unwrap_or("").to_string();

    let sent_at = message
        .date()
        .and_then(|d| Utc.timestamp_opt(d.to_timestamp(), 0).single());

    let body = match message.body_text(0) {
        Some(text) => text.into_owned(),
        None => message
            .body_html(0)
            .map(|html| strip_html(&html))
            .unwrap_or_default(),
    };

    let attachments = message
        .attachments()
        .map(|part| AttachmentMeta {
            name: part
                .attachment_name()
                .unwrap_or("attachment")
                .to_string(),
            mime_type: part.content_type().map(|ct| match ct.subtype() {
                Some(sub) => format!("{}/{}", ct.ctype(), sub),
                None => ct.ctype().to_string(),
            }),
            size: Some(part.contents().len() as i64),
        })
        .collect();

    Some(MessageEnvelope::build(
        sender_name,
        sender_email,
        to,
        cc,
        bcc,
        subject,
        sent_at,
        body,
        attachments,
        origin.to_string(),
    ))
}

/// Normalize a field-level record from a format-specific converter.
pub fn normalize_fielded(fielded: FieldedMessage) -> MessageEnvelope {
    let sent_at = fielded
        .sent_at_raw
        .as_deref()
        .and_then(parse_loose_datetime);
    MessageEnvelope::build(
        fielded.sender_name,
        fielded.sender_email,
        fielded.to,
        fielded.cc,
        fielded.bcc,
        fielded.subject,
        sent_at,
        fielded.body,
        fielded.attachments,
        fielded.origin,
    )
}

/// Normalize an ICS VEVENT. Unparsable datetimes become `None` rather than
/// failing the record.
pub fn normalize_event(raw: RawEvent) -> EventEnvelope {
    let starts_at = raw.dtstart.as_deref().and_then(parse_ics_datetime);
    let ends_at = raw.dtend.as_deref().and_then(parse_ics_datetime);
    EventEnvelope::build(raw.summary, raw.location, starts_at, ends_at, raw.origin)
}

fn first_addr(address: &Address) -> Option<(String, String)> {
    match address {
        Address::List(list) => list.first().map(addr_parts),
        Address::Group(groups) => groups
            .first()
            .and_then(|g| g.addresses.first())
            .map(addr_parts),
    }
}

fn addr_parts(addr: &mail_parser::Addr) -> (String, String) {
    (
        addr.name.as_deref().unwrap_or("").to_string(),
        addr.address.as_deref().unwrap_or("").to_string(),
    )
}

fn collect_addrs(address: Option<&Address>) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(address) = address {
        match address {
            Address::List(list) => {
                for addr in list {
                    if let Some(a) = addr.address.as_deref() {
                        out.push(a.to_string());
                    }
                }
            }
            Address::Group(groups) => {
                for group in groups {
                    for addr in &group.addresses {
                        if let Some(a) = addr.address.as_deref() {
                            out.push(a.to_string());
                        }
                    }
                }
            }
        }
    }
    out
}

/// Best-effort HTML → text. On extraction failure the raw markup is kept,
/// which keeps the record searchable rather than dropping it.
pub fn strip_html(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 100).unwrap_or_else(|_| html.to_string())
}

/// NFC-normalize and collapse runs of whitespace. Used for the hash inputs
/// so CRLF/LF and encoding differences between formats do not split
/// identical messages into distinct hashes.
pub fn normalize_text(s: &str) -> String {
    let composed: String = s.nfc().collect();
    composed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_address(addr: &str) -> String {
    addr.trim().trim_matches(|c| c == '<' || c == '>').to_lowercase()
}

fn normalize_addresses(addrs: Vec<String>) -> Vec<String> {
    addrs
        .into_iter()
        .map(|a| normalize_address(&a))
        .filter(|a| !a.is_empty())
        .collect()
}

/// SHA-256 over a length-prefixed serialization of the identity fields.
/// Length framing keeps the serialization unambiguous — ["ab","c"] and
/// ["a","bc"] hash differently.
pub fn message_content_hash(
    subject: &str,
    sender: &str,
    recipients: &[String],
    body: &str,
) -> String {
    let mut hasher = Sha256::new();
    update_framed(&mut hasher, subject.as_bytes());
    update_framed(&mut hasher, sender.as_bytes());
    hasher.update((recipients.len() as u64).to_le_bytes());
    for recipient in recipients {
        update_framed(&mut hasher, recipient.as_bytes());
    }
    update_framed(&mut hasher, body.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn event_content_hash(
    title: &str,
    location: &str,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
) -> String {
    let mut hasher = Sha256::new();
    update_framed(&mut hasher, title.as_bytes());
    update_framed(&mut hasher, location.as_bytes());
    update_framed(
        &mut hasher,
        starts_at.map(|d| d.to_rfc3339()).unwrap_or_default().as_bytes(),
    );
    update_framed(
        &mut hasher,
        ends_at.map(|d| d.to_rfc3339()).unwrap_or_default().as_bytes(),
    );
    hex::encode(hasher.finalize())
}

fn update_framed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Parse ICS datetime forms: `20240115T100000Z`, `20240115T100000`,
/// and date-only `20240115`.
pub fn parse_ics_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Some(stripped) = raw.strip_suffix('Z') {
        if let Ok(naive) = NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S") {
            return Some(naive.and_utc());
        }
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y%m%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Parse the loose datetime strings seen in XML exports: RFC 3339,
/// RFC 2822, and a couple of bare forms.
pub fn parse_loose_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}
