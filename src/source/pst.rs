//! PST extraction via the external `readpst` tool (libpst).
//!
//! PST is a proprietary binary container; rather than reimplement it, the
//! archive is streamed through `readpst -e` into a scratch directory of eml
//! files which then flow through the ordinary directory reader. The rest of
//! the pipeline never knows a PST was involved.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::IngestError;

/// Check whether `readpst` is resolvable on PATH.
pub fn readpst_available() -> bool {
    find_in_path("readpst").is_some()
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let exe = dir.join(format!("{name}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

/// Run readpst over the archive, writing eml files under the scratch
/// directory. Returns the output directory to stream from. A missing tool
/// or a failed conversion is archive-fatal.
pub fn extract_to_eml(pst_path: &Path, scratch: &Path) -> Result<PathBuf, IngestError> {
    if !readpst_available() {
        return Err(IngestError::PstToolMissing);
    }

    let out_dir = scratch.join("readpst");
    std::fs::create_dir_all(&out_dir).map_err(|e| IngestError::ArchiveRead {
        path: pst_path.to_path_buf(),
        detail: format!("cannot create scratch output: {e}"),
    })?;

    log::info!("readpst: extracting {} to scratch", pst_path.display());
    let output = Command::new("readpst")
        .arg("-D") // keep folder structure
        .arg("-r") // recurse into sub-folders
        .arg("-e") // one eml file per message
        .arg("-o")
        .arg(&out_dir)
        .arg(pst_path)
        .output()
        .map_err(|e| IngestError::PstToolFailed {
            path: pst_path.to_path_buf(),
            detail: format!("failed to launch readpst: {e}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(IngestError::PstToolFailed {
            path: pst_path.to_path_buf(),
            detail: format!(
                "exit status {}: {}. The file may be password-protected, in use, or an OLM export rather than a PST",
                output.status,
                stderr.trim()
            ),
        });
    }

    Ok(out_dir)
}
