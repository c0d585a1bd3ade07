//! Source reader dispatch.
//!
//! An archive's kind is detected by content inspection (magic bytes and
//! header sniffing — never the extension alone), then a format-specific
//! reader is chosen once per archive. Every reader satisfies the same
//! contract: a lazy, finite, restartable sequence of `RawRecord`s yielded
//! in a deterministic order, so a record's position is stable across runs
//! and checkpoints can index into the stream.
//!
//! A corrupt individual record becomes a `RawRecord::Corrupt` marker
//! (skipped and counted downstream); only an unreadable or unrecognized
//! root archive is fatal, and then only for that archive.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

use crate::envelope::{FieldedMessage, RawEvent};
use crate::error::IngestError;

pub mod eml;
pub mod ics;
pub mod mbox;
pub mod omx;
pub mod pst;
pub mod zip_file;

/// One unit read from a source archive, before normalization.
#[derive(Debug)]
pub enum RawRecord {
    /// An RFC 5322 message blob awaiting parsing.
    Mail { raw: Vec<u8>, origin: String },
    /// A message already reduced to fields by a format-specific converter.
    Fielded(FieldedMessage),
    /// A calendar event read from an ICS VEVENT.
    Event(RawEvent),
    /// A record that could not be decoded. Skipped and counted, never fatal.
    Corrupt { origin: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Pst,
    Zip,
    MboxFile,
    EmlFile,
    IcsFile,
    Directory,
}

impl ArchiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveKind::Pst => "pst",
            ArchiveKind::Zip => "zip",
            ArchiveKind::MboxFile => "mbox",
            ArchiveKind::EmlFile => "eml",
            ArchiveKind::IcsFile => "ics",
            ArchiveKind::Directory => "directory",
        }
    }
}

/// An opened archive: its detected kind and record stream. Holds the
/// scratch directory (PST/zip extraction) alive for the stream's lifetime.
pub struct ArchiveReader {
    pub kind: ArchiveKind,
    pub records: Box<dyn Iterator<Item = RawRecord> + Send>,
    _scratch: Option<TempDir>,
}

/// Detect an archive's kind from its content.
pub fn detect_kind(path: &Path) -> Result<ArchiveKind, IngestError> {
    if !path.exists() {
        return Err(IngestError::ArchiveNotFound(path.to_path_buf()));
    }
    if path.is_dir() {
        return Ok(ArchiveKind::Directory);
    }

    let mut head = [0u8; 4096];
    let n = File::open(path)
        .and_then(|mut f| f.read(&mut head))
        .map_err(|e| IngestError::ArchiveRead {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    let head = &head[..n];

    // PST: "!BDN" magic. Zip: local file header signature.
    if head.starts_with(b"!BDN") {
        return Ok(ArchiveKind::Pst);
    }
    if head.starts_with(b"PK\x03\x04") {
        return Ok(ArchiveKind::Zip);
    }

    let text = String::from_utf8_lossy(head);
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with("BEGIN:VCALENDAR") {
        return Ok(ArchiveKind::IcsFile);
    }
    if head.starts_with(b"From ") {
        return Ok(ArchiveKind::MboxFile);
    }
    if looks_like_message_headers(trimmed) {
        return Ok(ArchiveKind::EmlFile);
    }

    Err(IngestError::UnrecognizedFormat(path.to_path_buf()))
}

/// A bare RFC 5322 file starts with `Header-Name: value` lines.
fn looks_like_message_headers(text: &str) -> bool {
    let Some(first_line) = text.lines().next() else {
        return false;
    };
    let Some((name, _)) = first_line.split_once(':') else {
        return false;
    };
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Open an archive and return its record stream. Archive-fatal errors
/// (missing path, unrecognized format, missing readpst) surface here;
/// everything past this point degrades to per-record corrupt markers.
pub fn open_archive(path: &Path) -> Result<ArchiveReader, IngestError> {
    let kind = detect_kind(path)?;
    match kind {
        ArchiveKind::Directory => Ok(ArchiveReader {
            kind,
            records: Box::new(DirStream::new(path)),
            _scratch: None,
        }),
        ArchiveKind::EmlFile => {
            let origin = file_name_origin(path);
            let record = eml::mail_record(path, &origin);
            Ok(ArchiveReader {
                kind,
                records: Box::new(std::iter::once(record)),
                _scratch: None,
            })
        }
        ArchiveKind::MboxFile => {
            let origin = file_name_origin(path);
            let stream = mbox::MboxStream::open(path, &origin).map_err(|detail| {
                IngestError::ArchiveRead {
                    path: path.to_path_buf(),
                    detail,
                }
            })?;
            Ok(ArchiveReader {
                kind,
                records: Box::new(stream),
                _scratch: None,
            })
        }
        ArchiveKind::IcsFile => {
            let origin = file_name_origin(path);
            let records = ics::events_from_file(path, &origin);
            Ok(ArchiveReader {
                kind,
                records: Box::new(records.into_iter()),
                _scratch: None,
            })
        }
        ArchiveKind::Zip => {
            let scratch = new_scratch(path)?;
            zip_file::extract(path, scratch.path())?;
            let records: Box<dyn Iterator<Item = RawRecord> + Send> =
                if zip_file::contains_mail_files(scratch.path()) {
                    Box::new(DirStream::new(scratch.path()))
                } else {
                    // Outlook-for-Mac exports ship messages as XML files.
                    log::info!(
                        "{}: no eml/mbox/ics entries, trying Outlook-for-Mac XML conversion",
                        path.display()
                    );
                    Box::new(omx::OmxStream::new(scratch.path()))
                };
            Ok(ArchiveReader {
                kind,
                records,
                _scratch: Some(scratch),
            })
        }
        ArchiveKind::Pst => {
            let scratch = new_scratch(path)?;
            let out_dir = pst::extract_to_eml(path, scratch.path())?;
            Ok(ArchiveReader {
                kind,
                records: Box::new(DirStream::new(&out_dir)),
                _scratch: Some(scratch),
            })
        }
    }
}

fn new_scratch(path: &Path) -> Result<TempDir, IngestError> {
    tempfile::tempdir().map_err(|e| IngestError::ArchiveRead {
        path: path.to_path_buf(),
        detail: format!("cannot create scratch directory: {e}"),
    })
}

fn file_name_origin(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Streams records from a directory tree of eml/emlx/mbox/ics files.
/// Files are visited in sorted full-path order so positions are stable.
pub struct DirStream {
    root: PathBuf,
    files: std::vec::IntoIter<PathBuf>,
    current: Option<Box<dyn Iterator<Item = RawRecord> + Send>>,
}

impl DirStream {
    pub fn new(root: &Path) -> Self {
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        Self {
            root: root.to_path_buf(),
            files: files.into_iter(),
            current: None,
        }
    }

    fn origin_for(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

impl Iterator for DirStream {
    type Item = RawRecord;

    fn next(&mut self) -> Option<RawRecord> {
        loop {
            if let Some(inner) = &mut self.current {
                if let Some(record) = inner.next() {
                    return Some(record);
                }
                self.current = None;
            }

            let path = self.files.next()?;
            let origin = self.origin_for(&path);
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();

            match ext.as_str() {
                "eml" | "txt" => return Some(eml::mail_record(&path, &origin)),
                "emlx" => return Some(eml::emlx_record(&path, &origin)),
                "mbox" => match mbox::MboxStream::open(&path, &origin) {
                    Ok(stream) => self.current = Some(Box::new(stream)),
                    Err(reason) => return Some(RawRecord::Corrupt { origin, reason }),
                },
                "ics" => {
                    self.current = Some(Box::new(ics::events_from_file(&path, &origin).into_iter()))
                }
                _ => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        let mut f = File::create(&path).expect("create");
        f.write_all(bytes).expect("write");
        path
    }

    #[test]
    fn test_detect_kind_by_content_not_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A PST magic header behind a misleading extension is still a PST.
        let pst = write_file(dir.path(), "export.dat", b"!BDN\x00\x00rest");
        assert_eq!(detect_kind(&pst).expect("kind"), ArchiveKind::Pst);

        let zip = write_file(dir.path(), "export.bin", b"PK\x03\x04more");
        assert_eq!(detect_kind(&zip).expect("kind"), ArchiveKind::Zip);

        let ics = write_file(dir.path(), "cal.txt", b"BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n");
        assert_eq!(detect_kind(&ics).expect("kind"), ArchiveKind::IcsFile);

        let mbox = write_file(dir.path(), "all", b"From bob@acme.com Mon Jan 15\nSubject: x\n\nhi\n");
        assert_eq!(detect_kind(&mbox).expect("kind"), ArchiveKind::MboxFile);

        let eml = write_file(dir.path(), "one.data", b"From: a@b.c\r\nSubject: s\r\n\r\nbody\r\n");
        assert_eq!(detect_kind(&eml).expect("kind"), ArchiveKind::EmlFile);

        assert_eq!(detect_kind(dir.path()).expect("kind"), ArchiveKind::Directory);
    }

    #[test]
    fn test_detect_kind_missing_and_unrecognized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.pst");
        assert_eq!(
            detect_kind(&missing).unwrap_err().reason_code(),
            "archive-not-found"
        );

        let junk = write_file(dir.path(), "junk.bin", &[0u8, 1, 2, 3, 4, 5]);
        assert_eq!(
            detect_kind(&junk).unwrap_err().reason_code(),
            "archive-unrecognized"
        );
    }

    #[test]
    fn test_dir_stream_yields_sorted_and_skips_unknown() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "b/2.eml", b"From: b@x.y\r\nSubject: two\r\n\r\n2\r\n");
        write_file(dir.path(), "a/1.eml", b"From: a@x.y\r\nSubject: one\r\n\r\n1\r\n");
        write_file(dir.path(), "a/ignore.pdf", b"%PDF-1.4");

        let origins: Vec<String> = DirStream::new(dir.path())
            .map(|r| match r {
                RawRecord::Mail { origin, .. } => origin,
                other => panic!("unexpected record: {other:?}"),
            })
            .collect();
        assert_eq!(origins, vec!["a/1.eml", "b/2.eml"]);
    }

    #[test]
    fn test_open_archive_single_eml_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(dir.path(), "solo.eml", b"From: a@b.c\r\nSubject: s\r\n\r\nbody\r\n");
        let reader = open_archive(&path).expect("open");
        assert_eq!(reader.kind, ArchiveKind::EmlFile);
        assert_eq!(reader.records.count(), 1);
    }
}
