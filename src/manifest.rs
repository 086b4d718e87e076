/*============================================================
  Synavera Project: Repogen
  Module: repogen::manifest
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Resolve a package manifest reference into a manifest
    document plus a freshness timestamp. Local `file://`
    references are read directly; remote references are
    fetched and fall back to the manifest cache when the
    remote cannot be reached.

  Security / Safety Notes:
    A remote that answers with unparseable data is never
    replaced by cached data; only transport failures fall
    back to the cache.

  Dependencies:
    serde for the manifest document, reqwest::Url for URL
    joining, chrono for timestamps.

  Operational Scope:
    Called by the package assembler once per channel.

  Revision History:
    2025-03-02 COD  Authored manifest resolver.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Asymmetric failure policy made explicit in code
    - Cache writes are atomic per key
============================================================*/

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::FetchCache;
use crate::error::{RepogenError, Result};
use crate::fetch::{url_fixup, Fetcher};
use crate::logger::Logger;

/// Release track of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Release,
    Beta,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Release => "release",
            Channel::Beta => "beta",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageHash {
    pub sha256: String,
}

/// `rootRequired` is either a flag or the literal `"optional"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRootRequired", into = "RawRootRequired")]
pub enum RootRequired {
    Yes,
    No,
    Optional,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawRootRequired {
    Flag(bool),
    Text(String),
}

impl TryFrom<RawRootRequired> for RootRequired {
    type Error = String;

    fn try_from(raw: RawRootRequired) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawRootRequired::Flag(true) => Ok(RootRequired::Yes),
            RawRootRequired::Flag(false) => Ok(RootRequired::No),
            RawRootRequired::Text(text) if text == "optional" => Ok(RootRequired::Optional),
            RawRootRequired::Text(text) => Err(format!("invalid rootRequired value `{text}`")),
        }
    }
}

impl From<RootRequired> for RawRootRequired {
    fn from(value: RootRequired) -> Self {
        match value {
            RootRequired::Yes => RawRootRequired::Flag(true),
            RootRequired::No => RawRootRequired::Flag(false),
            RootRequired::Optional => RawRootRequired::Text("optional".into()),
        }
    }
}

/// Manifest document describing one installable release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub id: String,
    pub title: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub app_description: Option<String>,
    pub icon_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_required: Option<RootRequired>,
    pub ipk_url: String,
    pub ipk_hash: PackageHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipk_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_size: Option<u64>,
    /// Fields this generator does not interpret, carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Where a resolved manifest came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestOrigin {
    LocalFile,
    Remote,
    Cache,
}

/// A manifest together with the time it was last known fresh.
#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    pub manifest: PackageManifest,
    pub last_modified: DateTime<Utc>,
    pub origin: ManifestOrigin,
}

/// Resolves manifest references for the assembler.
pub struct ManifestResolver<'a, F: Fetcher> {
    fetcher: &'a F,
    cache: &'a FetchCache,
    logger: &'a Logger,
}

impl<'a, F: Fetcher> ManifestResolver<'a, F> {
    pub fn new(fetcher: &'a F, cache: &'a FetchCache, logger: &'a Logger) -> Self {
        Self {
            fetcher,
            cache,
            logger,
        }
    }

    /// Resolve `uri` for `package_id` on `channel`.
    pub async fn resolve(
        &self,
        package_id: &str,
        channel: Channel,
        uri: &str,
        offline: bool,
    ) -> Result<ResolvedManifest> {
        let url = Url::parse(uri).map_err(|err| RepogenError::malformed(uri, err))?;
        match url.scheme() {
            "file" => read_local_manifest(&url),
            "http" | "https" => self.resolve_remote(package_id, channel, uri, offline).await,
            other => Err(RepogenError::malformed(
                uri,
                format!("unsupported URL scheme `{other}`"),
            )),
        }
    }

    async fn resolve_remote(
        &self,
        package_id: &str,
        channel: Channel,
        uri: &str,
        offline: bool,
    ) -> Result<ResolvedManifest> {
        let key = FetchCache::manifest_key(package_id, channel.as_str());
        match self.fetch_remote(&key, uri, offline).await {
            Ok(resolved) => Ok(resolved),
            Err(err) if err.is_transport() => self.fall_back_to_cache(&key, err),
            Err(err) => Err(err),
        }
    }

    async fn fetch_remote(&self, key: &str, uri: &str, offline: bool) -> Result<ResolvedManifest> {
        if offline {
            return Err(RepogenError::transport(uri, "offline mode"));
        }
        let fixed = url_fixup(uri);
        let url = Url::parse(&fixed).map_err(|err| RepogenError::malformed(&fixed, err))?;

        let response = self.fetcher.get(&url).await?;
        if response.status != 200 {
            return Err(RepogenError::transport(
                url.as_str(),
                format!("failed to fetch manifest: HTTP {}", response.status),
            ));
        }

        let mut manifest: PackageManifest = serde_json::from_slice(&response.body)
            .map_err(|err| RepogenError::malformed(url.as_str(), err))?;
        let ipk_url = url.join(&manifest.ipk_url).map_err(|err| {
            RepogenError::malformed(
                url.as_str(),
                format!("cannot resolve ipkUrl `{}`: {err}", manifest.ipk_url),
            )
        })?;
        manifest.ipk_url = ipk_url.to_string();
        if let Some(size) = self.fetcher.content_length(&ipk_url).await {
            manifest.ipk_size = Some(size);
        }

        let bytes = serde_json::to_vec(&manifest).map_err(|err| {
            RepogenError::Serialization(format!("Failed to encode manifest {key}: {err}"))
        })?;
        self.logger
            .debug("FETCH", format!("{url} -> version {}", manifest.version));
        if let Err(err) = self.cache.put(key, &bytes, response.last_modified) {
            self.logger.warn("CACHE", format!("Cannot store {key}: {err}"));
        }

        Ok(ResolvedManifest {
            manifest,
            last_modified: response.last_modified.unwrap_or_else(Utc::now),
            origin: ManifestOrigin::Remote,
        })
    }

    fn fall_back_to_cache(&self, key: &str, failure: RepogenError) -> Result<ResolvedManifest> {
        if !self.cache.exists(key) {
            return Err(failure);
        }
        let entry = match self.cache.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Err(failure),
            Err(err) => {
                self.logger.warn("CACHE", format!("Unreadable entry {key}: {err}"));
                self.evict_quietly(key);
                return Err(failure);
            }
        };
        match serde_json::from_slice::<PackageManifest>(&entry.bytes) {
            Ok(manifest) => {
                self.logger
                    .info("CACHE", format!("Using cached {key} after: {failure}"));
                Ok(ResolvedManifest {
                    manifest,
                    last_modified: entry.modified,
                    origin: ManifestOrigin::Cache,
                })
            }
            Err(err) => {
                self.logger
                    .warn("CACHE", format!("Discarding corrupt entry {key}: {err}"));
                self.evict_quietly(key);
                Err(failure)
            }
        }
    }

    fn evict_quietly(&self, key: &str) {
        if let Err(err) = self.cache.evict(key) {
            self.logger.warn("CACHE", err.to_string());
        }
    }
}

fn read_local_manifest(url: &Url) -> Result<ResolvedManifest> {
    let path = url.to_file_path().map_err(|_| RepogenError::ManifestRead {
        path: url.to_string(),
        reason: "not a local file path".into(),
    })?;
    let read_error = |reason: String| RepogenError::ManifestRead {
        path: path.display().to_string(),
        reason,
    };
    let bytes = std::fs::read(&path).map_err(|err| read_error(err.to_string()))?;
    let modified = std::fs::metadata(&path)
        .and_then(|meta| meta.modified())
        .map_err(|err| read_error(err.to_string()))?;
    let manifest = serde_json::from_slice(&bytes).map_err(|err| read_error(err.to_string()))?;
    Ok(ResolvedManifest {
        manifest,
        last_modified: DateTime::<Utc>::from(modified),
        origin: ManifestOrigin::LocalFile,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Minimal valid manifest JSON.
    pub fn manifest_json(id: &str, version: &str, ipk_url: &str) -> String {
        format!(
            r#"{{"id":"{id}","title":"{id}","version":"{version}","type":"web",
            "appDescription":"An app","iconUri":"icon.png","ipkUrl":"{ipk_url}",
            "ipkHash":{{"sha256":"abc123"}}}}"#
        )
    }
}
