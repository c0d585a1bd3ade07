//! Outlook-for-Mac XML export conversion.
//!
//! Some Outlook exports arrive as a zip of per-message XML files rather
//! than eml/mbox. The element vocabulary varies between Outlook versions,
//! so each document is flattened to a local-name → values map and the
//! message fields are picked from known key candidates, with a regex sweep
//! for addresses. Files that yield neither subject nor body are skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use walkdir::WalkDir;

use super::RawRecord;
use crate::envelope::{AttachmentMeta, FieldedMessage};

const SUBJECT_KEYS: &[&str] = &[
    "subject",
    "mssubject",
    "itemsubject",
    "title",
    "opfmessagecopysubject",
];
const BODY_KEYS: &[&str] = &[
    "body",
    "textbody",
    "plaintext",
    "preview",
    "bodypreview",
    "content",
    "opfmessagecopybody",
];
const SENT_KEYS: &[&str] = &[
    "datesent",
    "datetimesent",
    "sent",
    "date",
    "receivedtime",
    "opfmessagecopyreceivedtime",
    "opfmessagecopysenttime",
];
const SENDER_KEYS: &[&str] = &[
    "from",
    "sender",
    "fromname",
    "fromemailaddress",
    "opfmessagecopysenderaddress",
];
const TO_KEYS: &[&str] = &["to", "torecipients", "recipient", "toaddresses", "toemailaddress"];
const CC_KEYS: &[&str] = &["cc", "ccrecipients", "ccaddresses", "ccemailaddress"];
const BCC_KEYS: &[&str] = &["bcc", "bccrecipients", "bccaddresses", "bccemailaddress"];

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("static regex")
    })
}

/// Streams fielded messages from a tree of Outlook-for-Mac XML files,
/// sorted-path order. Undecodable files are skipped silently — there is
/// usually a large amount of non-message XML in these exports.
pub struct OmxStream {
    root: PathBuf,
    files: std::vec::IntoIter<PathBuf>,
}

impl OmxStream {
    pub fn new(root: &Path) -> Self {
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                name.ends_with(".xml") && name != "categories.xml"
            })
            .collect();
        files.sort();
        Self {
            root: root.to_path_buf(),
            files: files.into_iter(),
        }
    }
}

impl Iterator for OmxStream {
    type Item = RawRecord;

    fn next(&mut self) -> Option<RawRecord> {
        loop {
            let path = self.files.next()?;
            let origin = path
                .strip_prefix(&self.root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            if let Some(fielded) = parse_message_xml(&path, &origin) {
                return Some(RawRecord::Fielded(fielded));
            }
        }
    }
}

/// Flatten an XML document and pick message fields out of it.
pub fn parse_message_xml(path: &Path, origin: &str) -> Option<FieldedMessage> {
    let flat = flatten_xml(path)?;

    let subject = pick(&flat, SUBJECT_KEYS).unwrap_or_default();
    let body = pick(&flat, BODY_KEYS).unwrap_or_default();
    if subject.is_empty() && body.is_empty() {
        return None;
    }

    let sent_at_raw = pick(&flat, SENT_KEYS);
    let sender_block = pick(&flat, SENDER_KEYS).unwrap_or_default();
    let sender_email = email_re()
        .find(&sender_block)
        .map(|m| m.as_str().to_string())
        .or_else(|| first_email_anywhere(&flat));

    Some(FieldedMessage {
        sender_name: sender_email.clone().unwrap_or_default(),
        sender_email: sender_email.unwrap_or_default(),
        to: collect_emails(&flat, TO_KEYS),
        cc: collect_emails(&flat, CC_KEYS),
        bcc: collect_emails(&flat, BCC_KEYS),
        subject,
        body,
        sent_at_raw,
        attachments: attachment_candidates(path),
        origin: origin.to_string(),
    })
}

/// Local-name → text values, element text and attribute values alike
/// (addresses often hide in attributes like OPFContactEmailAddressAddress).
fn flatten_xml(path: &Path) -> Option<BTreeMap<String, Vec<String>>> {
    let mut reader = Reader::from_file(path).ok()?;
    let mut flat: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                current = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                for attr in e.attributes().flatten() {
                    if let Ok(value) = attr.unescape_value() {
                        let value = value.trim();
                        if !value.is_empty() {
                            flat.entry(current.clone()).or_default().push(value.to_string());
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Ok(value) = t.unescape() {
                    let value = value.trim();
                    if !value.is_empty() && !current.is_empty() {
                        flat.entry(current.clone()).or_default().push(value.to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return None,
        }
        buf.clear();
    }

    Some(flat)
}

fn pick(flat: &BTreeMap<String, Vec<String>>, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(values) = flat.get(*key) {
            if let Some(first) = values.first() {
                return Some(first.clone());
            }
        }
    }
    None
}

fn first_email_anywhere(flat: &BTreeMap<String, Vec<String>>) -> Option<String> {
    for values in flat.values() {
        for value in values {
            if let Some(m) = email_re().find(value) {
                return Some(m.as_str().to_string());
            }
        }
    }
    None
}

fn collect_emails(flat: &BTreeMap<String, Vec<String>>, keys: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for key in keys {
        for value in flat.get(*key).map(Vec::as_slice).unwrap_or_default() {
            for m in email_re().find_iter(value) {
                let addr = m.as_str().to_string();
                if !out.contains(&addr) {
                    out.push(addr);
                }
            }
        }
    }
    out
}

/// Attachment names and sizes from the export's sibling attachment folder.
/// Metadata only; blobs are not carried into the store.
fn attachment_candidates(xml_path: &Path) -> Vec<AttachmentMeta> {
    let Some(dir) = xml_path.parent() else {
        return Vec::new();
    };
    let att_dir = dir.join("com.microsoft.__Attachments");
    if !att_dir.is_dir() {
        return Vec::new();
    }

    let mut names: Vec<PathBuf> = std::fs::read_dir(&att_dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .filter(|p| {
                    p.extension()
                        .map(|e| !e.eq_ignore_ascii_case("xml"))
                        .unwrap_or(true)
                })
                .collect()
        })
        .unwrap_or_default();
    names.sort();

    names
        .into_iter()
        .take(10)
        .map(|p| AttachmentMeta {
            name: p
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "attachment".to_string()),
            mime_type: None,
            size: std::fs::metadata(&p).ok().map(|m| m.len() as i64),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::normalize_fielded;

    fn write_xml(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).expect("write xml");
        path
    }

    const MESSAGE_XML: &str = r#"<?xml version="1.0"?>
<email>
  <OPFMessageCopySubject>Renewal scope</OPFMessageCopySubject>
  <OPFMessageCopyBody>Let's finalize the acme renewal.</OPFMessageCopyBody>
  <OPFMessageCopySentTime>2024-01-15T10:00:00</OPFMessageCopySentTime>
  <OPFMessageCopySenderAddress>Bob Smith &lt;bob@acme.com&gt;</OPFMessageCopySenderAddress>
  <OPFMessageCopyToAddresses>alice@partner.io; carol@acme.com</OPFMessageCopyToAddresses>
</email>
"#;

    #[test]
    fn test_parse_message_xml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_xml(dir.path(), "message_0001.xml", MESSAGE_XML);

        let fielded = parse_message_xml(&path, "message_0001.xml").expect("parses");
        assert_eq!(fielded.subject, "Renewal scope");
        assert_eq!(fielded.sender_email, "bob@acme.com");
        assert_eq!(fielded.to, vec!["alice@partner.io", "carol@acme.com"]);
        assert_eq!(fielded.sent_at_raw.as_deref(), Some("2024-01-15T10:00:00"));

        let env = normalize_fielded(fielded);
        assert!(env.sent_at.is_some());
        assert_eq!(env.sender_email, "bob@acme.com");
    }

    #[test]
    fn test_sender_found_in_attributes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let xml = r#"<email>
  <subject>attr sender</subject>
  <emailAddress OPFContactEmailAddressAddress="dana@acme.com"/>
</email>"#;
        let path = write_xml(dir.path(), "m.xml", xml);
        let fielded = parse_message_xml(&path, "m.xml").expect("parses");
        assert_eq!(fielded.sender_email, "dana@acme.com");
    }

    #[test]
    fn test_empty_document_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_xml(dir.path(), "empty.xml", "<email><other>x</other></email>");
        assert!(parse_message_xml(&path, "empty.xml").is_none());
    }

    #[test]
    fn test_stream_skips_categories_and_non_xml() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_xml(dir.path(), "categories.xml", "<categories/>");
        write_xml(dir.path(), "message_0001.xml", MESSAGE_XML);
        std::fs::write(dir.path().join("blob.bin"), b"junk").expect("write");

        let records: Vec<RawRecord> = OmxStream::new(dir.path()).collect();
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], RawRecord::Fielded(_)));
    }
}
