/*============================================================
  Synavera Project: Repogen
  Module: repogen::fsio
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Atomic file writes shared by the manifest cache and the
    output renderers.

  Security / Safety Notes:
    Temp files are created beside the destination so the final
    rename never crosses filesystems.

  Dependencies:
    tempfile for named temp files, filetime for mtimes.

  Operational Scope:
    Every artifact repogen produces goes through write_atomic.

  Revision History:
    2025-03-02 COD  Extracted atomic write helper.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Readers never observe partially written files
============================================================*/

use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use filetime::FileTime;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{RepogenError, Result};

/// Write `contents` to `path` via temp file and rename, creating parents.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    write_atomic_with_mtime(path, contents, None)
}

/// As [`write_atomic`], stamping the file with `modified` before it appears.
pub fn write_atomic_with_mtime(
    path: &Path,
    contents: &[u8],
    modified: Option<SystemTime>,
) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|err| {
        RepogenError::Filesystem(format!(
            "Failed to create directory {}: {err}",
            parent.display()
        ))
    })?;

    let fail = |err: std::io::Error| {
        RepogenError::Filesystem(format!("Failed to write {}: {err}", path.display()))
    };
    let mut temp = NamedTempFile::new_in(parent).map_err(fail)?;
    temp.write_all(contents).map_err(fail)?;
    temp.as_file().sync_all().map_err(fail)?;
    if let Some(modified) = modified {
        filetime::set_file_mtime(temp.path(), FileTime::from_system_time(modified))
            .map_err(fail)?;
    }
    temp.persist(path).map_err(|err| fail(err.error))?;
    Ok(())
}

/// Serialize `value` as two-space indented JSON and write it atomically.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|err| {
        RepogenError::Serialization(format!("Failed to encode {}: {err}", path.display()))
    })?;
    write_atomic(path, &bytes)
}

/// Serialize `value` as compact JSON and write it atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value).map_err(|err| {
        RepogenError::Serialization(format!("Failed to encode {}: {err}", path.display()))
    })?;
    write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    #[test]
    fn creates_parents_and_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("a").join("b").join("out.json");
        write_atomic(&target, b"{}").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"{}");
        let siblings: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(siblings.len(), 1);
    }

    #[test]
    fn stamps_requested_mtime() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("stamped");
        let when = UNIX_EPOCH + Duration::from_secs(1_445_412_480);
        write_atomic_with_mtime(&target, b"x", Some(when)).unwrap();
        let modified = std::fs::metadata(&target).unwrap().modified().unwrap();
        assert_eq!(modified, when);
    }
}
