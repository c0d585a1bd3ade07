//! Per-archive ingest checkpoints.
//!
//! A checkpoint records the last fully-committed record position for one
//! archive, together with a fingerprint of the archive's content. The file
//! is written to a temp path and atomically renamed into place so a crash
//! mid-write can never tear it. On resume, a fingerprint mismatch discards
//! the checkpoint and ingestion restarts from zero — content-addressed
//! dedup keeps the rows that were already committed from duplicating.
//!
//! Positions are 1-based record indexes within the archive's deterministic
//! stream; `advance` is only called after the corresponding batch
//! transaction has committed.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::IngestError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub archive_fingerprint: String,
    pub last_committed_position: u64,
    pub updated_at: String,
}

/// A directory of per-archive checkpoint files, named by a hash of the
/// archive's absolute path.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: &Path) -> Result<Self, String> {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Failed to create checkpoint directory {}: {e}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn file_for(&self, archive: &Path) -> PathBuf {
        let canonical = archive
            .canonicalize()
            .unwrap_or_else(|_| archive.to_path_buf());
        let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
        self.dir
            .join(format!("{}.json", &hex::encode(digest)[..16]))
    }

    /// Load the checkpoint for an archive, validating it against the
    /// archive's current fingerprint. A missing, unreadable, or stale
    /// checkpoint is `None` — ingestion restarts from the beginning.
    pub fn load(&self, archive: &Path, fingerprint: &str) -> Option<Checkpoint> {
        let path = self.file_for(archive);
        let text = std::fs::read_to_string(&path).ok()?;
        let checkpoint: Checkpoint = match serde_json::from_str(&text) {
            Ok(cp) => cp,
            Err(e) => {
                log::warn!("Discarding unreadable checkpoint {}: {e}", path.display());
                return None;
            }
        };
        if checkpoint.archive_fingerprint != fingerprint {
            log::info!(
                "{}: archive fingerprint changed, discarding checkpoint at position {}",
                archive.display(),
                checkpoint.last_committed_position
            );
            return None;
        }
        Some(checkpoint)
    }

    /// Persist a new cursor. Only call after the batch covering
    /// `position` has durably committed.
    pub fn advance(&self, archive: &Path, fingerprint: &str, position: u64) -> Result<(), String> {
        let checkpoint = Checkpoint {
            archive_fingerprint: fingerprint.to_string(),
            last_committed_position: position,
            updated_at: Utc::now().to_rfc3339(),
        };
        let path = self.file_for(archive);
        let tmp = path.with_extension("json.tmp");

        let body = serde_json::to_string_pretty(&checkpoint)
            .map_err(|e| format!("Failed to serialize checkpoint: {e}"))?;
        std::fs::write(&tmp, body)
            .map_err(|e| format!("Failed to write checkpoint temp file: {e}"))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| format!("Failed to replace checkpoint {}: {e}", path.display()))?;
        Ok(())
    }

    /// Remove an archive's checkpoint (used when a stale fingerprint was
    /// detected and ingestion restarts from zero).
    pub fn clear(&self, archive: &Path) {
        let _ = std::fs::remove_file(self.file_for(archive));
    }
}

/// Fingerprint an archive's content. Files hash their size plus head and
/// tail samples (fast even on multi-GB PSTs); directories hash the sorted
/// (relative path, size) listing.
pub fn archive_fingerprint(path: &Path) -> Result<String, IngestError> {
    let read_err = |detail: String| IngestError::ArchiveRead {
        path: path.to_path_buf(),
        detail,
    };

    if !path.exists() {
        return Err(IngestError::ArchiveNotFound(path.to_path_buf()));
    }

    let mut hasher = Sha256::new();
    if path.is_dir() {
        let mut entries: Vec<(String, u64)> = WalkDir::new(path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                let rel = entry
                    .path()
                    .strip_prefix(path)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                (rel, size)
            })
            .collect();
        entries.sort();
        for (rel, size) in entries {
            hasher.update(rel.as_bytes());
            hasher.update([0u8]);
            hasher.update(size.to_le_bytes());
        }
    } else {
        let meta = std::fs::metadata(path).map_err(|e| read_err(e.to_string()))?;
        let size = meta.len();
        hasher.update(size.to_le_bytes());

        let mut file = File::open(path).map_err(|e| read_err(e.to_string()))?;
        let mut head = vec![0u8; 64 * 1024];
        let n = file.read(&mut head).map_err(|e| read_err(e.to_string()))?;
        hasher.update(&head[..n]);

        if size > 2 * 64 * 1024 {
            use std::io::{Seek, SeekFrom};
            file.seek(SeekFrom::End(-(64 * 1024)))
                .map_err(|e| read_err(e.to_string()))?;
            let mut tail = vec![0u8; 64 * 1024];
            let n = file.read(&mut tail).map_err(|e| read_err(e.to_string()))?;
            hasher.update(&tail[..n]);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, CheckpointStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::new(&dir.path().join("checkpoints")).expect("store");
        (dir, store)
    }

    #[test]
    fn test_advance_and_load_roundtrip() {
        let (dir, store) = store();
        let archive = dir.path().join("box.mbox");
        std::fs::write(&archive, b"From a@b.c\nSubject: x\n\nbody\n").expect("write");
        let fp = archive_fingerprint(&archive).expect("fingerprint");

        assert!(store.load(&archive, &fp).is_none());
        store.advance(&archive, &fp, 42).expect("advance");

        let loaded = store.load(&archive, &fp).expect("checkpoint");
        assert_eq!(loaded.last_committed_position, 42);
        assert_eq!(loaded.archive_fingerprint, fp);

        // Monotonic updates overwrite in place
        store.advance(&archive, &fp, 100).expect("advance again");
        let loaded = store.load(&archive, &fp).expect("checkpoint");
        assert_eq!(loaded.last_committed_position, 100);
    }

    #[test]
    fn test_fingerprint_mismatch_discards_checkpoint() {
        let (dir, store) = store();
        let archive = dir.path().join("box.mbox");
        std::fs::write(&archive, b"From a@b.c\n\nbody\n").expect("write");
        let fp = archive_fingerprint(&archive).expect("fingerprint");
        store.advance(&archive, &fp, 7).expect("advance");

        // Archive content changes → old checkpoint must not be honored
        std::fs::write(&archive, b"From a@b.c\n\nbody\nFrom c@d.e\n\nmore\n").expect("rewrite");
        let new_fp = archive_fingerprint(&archive).expect("fingerprint");
        assert_ne!(fp, new_fp);
        assert!(store.load(&archive, &new_fp).is_none());
    }

    #[test]
    fn test_corrupt_checkpoint_file_is_discarded() {
        let (dir, store) = store();
        let archive = dir.path().join("a.mbox");
        std::fs::write(&archive, b"From a@b.c\n\nx\n").expect("write");
        let fp = archive_fingerprint(&archive).expect("fingerprint");
        store.advance(&archive, &fp, 3).expect("advance");

        // Tear the file by hand; load must degrade to None, not panic
        let file = store.file_for(&archive);
        std::fs::write(&file, b"{not json").expect("corrupt");
        assert!(store.load(&archive, &fp).is_none());
    }

    #[test]
    fn test_no_stray_temp_file_after_advance() {
        let (dir, store) = store();
        let archive = dir.path().join("a.mbox");
        std::fs::write(&archive, b"From a@b.c\n\nx\n").expect("write");
        let fp = archive_fingerprint(&archive).expect("fingerprint");
        store.advance(&archive, &fp, 1).expect("advance");

        let stray: Vec<_> = std::fs::read_dir(&store.dir)
            .expect("read dir")
            .flatten()
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(stray.is_empty());
    }

    #[test]
    fn test_directory_fingerprint_tracks_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("tree");
        std::fs::create_dir_all(root.join("inbox")).expect("mkdir");
        std::fs::write(root.join("inbox/1.eml"), b"From: a@b.c\r\n\r\nx\r\n").expect("write");

        let fp1 = archive_fingerprint(&root).expect("fingerprint");
        std::fs::write(root.join("inbox/2.eml"), b"From: c@d.e\r\n\r\ny\r\n").expect("write");
        let fp2 = archive_fingerprint(&root).expect("fingerprint");
        assert_ne!(fp1, fp2);
    }

    #[test]
    fn test_clear_removes_checkpoint() {
        let (dir, store) = store();
        let archive = dir.path().join("a.mbox");
        std::fs::write(&archive, b"From a@b.c\n\nx\n").expect("write");
        let fp = archive_fingerprint(&archive).expect("fingerprint");
        store.advance(&archive, &fp, 5).expect("advance");
        store.clear(&archive);
        assert!(store.load(&archive, &fp).is_none());
    }
}
