//! Zip export handling: extract to a scratch directory, then recurse into
//! the extracted tree with the ordinary directory reader.

use std::fs::File;
use std::path::Path;

use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::IngestError;

/// Extract a zip archive into `dest`. Entries whose names escape the
/// destination (zip-slip) are skipped.
pub fn extract(zip_path: &Path, dest: &Path) -> Result<(), IngestError> {
    let read_err = |detail: String| IngestError::ArchiveRead {
        path: zip_path.to_path_buf(),
        detail,
    };

    let file = File::open(zip_path).map_err(|e| read_err(format!("cannot open: {e}")))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| read_err(format!("not a readable zip: {e}")))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| read_err(format!("bad zip entry {i}: {e}")))?;
        let Some(rel) = entry.enclosed_name() else {
            log::warn!(
                "{}: skipping zip entry with unsafe path {:?}",
                zip_path.display(),
                entry.name()
            );
            continue;
        };
        let out_path = dest.join(rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| read_err(format!("cannot create {}: {e}", out_path.display())))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| read_err(format!("cannot create {}: {e}", parent.display())))?;
        }
        let mut out = File::create(&out_path)
            .map_err(|e| read_err(format!("cannot write {}: {e}", out_path.display())))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| read_err(format!("cannot extract {}: {e}", out_path.display())))?;
    }

    Ok(())
}

/// Whether the extracted tree contains any files the directory reader can
/// consume. When it doesn't, the zip is likely an Outlook-for-Mac XML
/// export and the caller falls back to that converter.
pub fn contains_mail_files(root: &Path) -> bool {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .any(|entry| {
            matches!(
                entry
                    .path()
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .as_deref(),
                Some("eml") | Some("emlx") | Some("mbox") | Some("ics")
            )
        })
}
