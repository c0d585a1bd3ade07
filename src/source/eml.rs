//! Single-message file readers: `.eml` (plus readpst's `.txt` output) and
//! Apple Mail `.emlx`.

use std::path::Path;

use super::RawRecord;

/// Read one eml file as a mail record. Read failures degrade to a corrupt
/// marker — one bad file never aborts the archive.
pub fn mail_record(path: &Path, origin: &str) -> RawRecord {
    match std::fs::read(path) {
        Ok(raw) => RawRecord::Mail {
            raw,
            origin: origin.to_string(),
        },
        Err(e) => RawRecord::Corrupt {
            origin: origin.to_string(),
            reason: format!("unreadable file: {e}"),
        },
    }
}

/// Read an emlx file. The format is a decimal byte-count line, the RFC 5322
/// payload, then an XML plist of flags; only the payload is kept.
pub fn emlx_record(path: &Path, origin: &str) -> RawRecord {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) => {
            return RawRecord::Corrupt {
                origin: origin.to_string(),
                reason: format!("unreadable file: {e}"),
            }
        }
    };
    RawRecord::Mail {
        raw: strip_emlx_envelope(raw),
        origin: origin.to_string(),
    }
}

fn strip_emlx_envelope(raw: Vec<u8>) -> Vec<u8> {
    let Some(newline) = raw.iter().position(|&b| b == b'\n') else {
        return raw;
    };
    let first_line = String::from_utf8_lossy(&raw[..newline]);
    let Ok(length) = first_line.trim().parse::<usize>() else {
        // No length prefix; some emlx variants are bare RFC 5322.
        return raw;
    };
    let payload = &raw[newline + 1..];
    let end = length.min(payload.len());
    payload[..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::normalize_mail;
    use std::io::Write;

    const MESSAGE: &[u8] = b"From: a@b.c\r\nSubject: emlx test\r\n\r\nhello\r\n";

    #[test]
    fn test_emlx_length_prefix_is_stripped() {
        let mut raw = format!("{}\n", MESSAGE.len()).into_bytes();
        raw.extend_from_slice(MESSAGE);
        raw.extend_from_slice(b"<?xml version=\"1.0\"?><plist/>");

        let stripped = strip_emlx_envelope(raw);
        assert_eq!(stripped, MESSAGE);
        let env = normalize_mail(&stripped, "x.emlx").expect("parses");
        assert_eq!(env.subject, "emlx test");
    }

    #[test]
    fn test_emlx_without_prefix_passes_through() {
        let stripped = strip_emlx_envelope(MESSAGE.to_vec());
        assert_eq!(stripped, MESSAGE);
    }

    #[test]
    fn test_unreadable_file_is_corrupt_not_fatal() {
        let record = mail_record(Path::new("/nonexistent/msg.eml"), "msg.eml");
        assert!(matches!(record, RawRecord::Corrupt { .. }));
    }

    #[test]
    fn test_mail_record_reads_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("m.eml");
        let mut f = std::fs::File::create(&path).expect("create");
        f.write_all(MESSAGE).expect("write");

        match mail_record(&path, "m.eml") {
            RawRecord::Mail { raw, origin } => {
                assert_eq!(raw, MESSAGE);
                assert_eq!(origin, "m.eml");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
