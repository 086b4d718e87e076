/*============================================================
  Synavera Project: Repogen
  Module: repogen::cache
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    On-disk fallback store for remote manifests, keyed by
    package id and channel. The file mtime records when the
    cached manifest was last confirmed fresh.

  Security / Safety Notes:
    Keys are derived from descriptor file stems; entries never
    leave the configured cache directory.

  Dependencies:
    chrono for timestamps; writes go through fsio.

  Operational Scope:
    Owned by the manifest resolver. Entries never expire.

  Revision History:
    2025-03-02 COD  Authored manifest fetch cache.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Atomic replacement of entries
    - No implicit directory creation on read paths
============================================================*/

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::error::{RepogenError, Result};
use crate::fsio;

/// A cached document and the time it was last confirmed fresh.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub bytes: Vec<u8>,
    pub modified: DateTime<Utc>,
}

/// Flat directory of cache entries.
#[derive(Debug, Clone)]
pub struct FetchCache {
    root: PathBuf,
}

impl FetchCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cache key for a package manifest on a given channel.
    pub fn manifest_key(package_id: &str, channel: &str) -> String {
        format!("manifest_{package_id}_{channel}.json")
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.path(key).is_file()
    }

    /// Read an entry, returning `None` when it does not exist.
    pub fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.path(key);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(RepogenError::Filesystem(format!(
                    "Failed to read cache entry {}: {err}",
                    path.display()
                )))
            }
        };
        let modified = std::fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .map_err(|err| {
                RepogenError::Filesystem(format!(
                    "Failed to stat cache entry {}: {err}",
                    path.display()
                ))
            })?;
        Ok(Some(CacheEntry {
            bytes,
            modified: DateTime::<Utc>::from(modified),
        }))
    }

    /// Atomically replace an entry, stamping it with `modified` (or now).
    pub fn put(&self, key: &str, bytes: &[u8], modified: Option<DateTime<Utc>>) -> Result<()> {
        let stamp = modified.map(SystemTime::from).unwrap_or_else(SystemTime::now);
        fsio::write_atomic_with_mtime(&self.path(key), bytes, Some(stamp))
    }

    /// Remove an entry; a missing entry is not an error.
    pub fn evict(&self, key: &str) -> Result<()> {
        let path = self.path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(RepogenError::Filesystem(format!(
                "Failed to evict cache entry {}: {err}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn manifest_keys_are_deterministic() {
        assert_eq!(
            FetchCache::manifest_key("org.example.app", "beta"),
            "manifest_org.example.app_beta.json"
        );
    }

    #[test]
    fn put_then_get_preserves_bytes_and_mtime() {
        let temp = TempDir::new().unwrap();
        let cache = FetchCache::new(temp.path().join("cache"));
        let when = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();

        cache.put("k.json", b"{\"a\":1}", Some(when)).unwrap();

        let entry = cache.get("k.json").unwrap().unwrap();
        assert_eq!(entry.bytes, b"{\"a\":1}");
        assert_eq!(entry.modified, when);
        assert!(cache.exists("k.json"));
    }

    #[test]
    fn put_overwrites_previous_entry() {
        let temp = TempDir::new().unwrap();
        let cache = FetchCache::new(temp.path().to_path_buf());
        cache.put("k.json", b"old", None).unwrap();
        cache.put("k.json", b"new", None).unwrap();
        assert_eq!(cache.get("k.json").unwrap().unwrap().bytes, b"new");
    }

    #[test]
    fn missing_entries_and_eviction() {
        let temp = TempDir::new().unwrap();
        let cache = FetchCache::new(temp.path().join("never-created"));
        assert!(cache.get("absent.json").unwrap().is_none());
        assert!(!cache.exists("absent.json"));
        cache.evict("absent.json").unwrap();
        assert!(!cache.root().exists());

        cache.put("present.json", b"x", None).unwrap();
        assert!(cache.exists("present.json"));
        cache.evict("present.json").unwrap();
        assert!(!cache.exists("present.json"));
    }
}
