/*============================================================
  Synavera Project: Repogen
  Module: repogen::package_info
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Assemble complete package records from descriptors and
    their resolved manifests, and enumerate a descriptor
    directory into a sorted package list.

  Security / Safety Notes:
    Descriptor descriptions are untrusted HTML and are reduced
    to an allow-listed subset before they reach any output.

  Dependencies:
    ammonia for sanitization, chrono for display timestamps.

  Operational Scope:
    Feeds both the JSON API and the HTML listing renderers.

  Revision History:
    2025-03-02 COD  Authored package assembler.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Per-descriptor failures reported, never fatal to a run
    - Deterministic ordering for reproducible output
============================================================*/

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DisplayZone;
use crate::error::{RepogenError, Result};
use crate::fetch::{url_fixup, Fetcher};
use crate::logger::Logger;
use crate::manifest::{Channel, ManifestResolver, PackageManifest};
use crate::registry::{load_registry, package_id, PackageRegistry, PackageRequirements};

/// Licensing classification of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pool {
    #[serde(rename = "main")]
    Main,
    #[serde(rename = "non-free")]
    NonFree,
}

impl Pool {
    pub fn as_str(self) -> &'static str {
        match self {
            Pool::Main => "main",
            Pool::NonFree => "non-free",
        }
    }
}

impl FromStr for Pool {
    type Err = RepogenError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "main" => Ok(Pool::Main),
            "non-free" => Ok(Pool::NonFree),
            other => Err(RepogenError::PoolClassifier {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully materialised package, rebuilt on every run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    pub id: String,
    pub title: String,
    pub icon_uri: String,
    pub manifest_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_url_beta: Option<String>,
    pub category: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_icon_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding: Option<BTreeMap<String, Vec<String>>>,
    pub pool: Pool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<PackageRequirements>,
    pub manifest: PackageManifest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_beta: Option<PackageManifest>,
    #[serde(rename = "lastmodified")]
    pub last_modified: DateTime<Utc>,
    #[serde(rename = "lastmodified_str")]
    pub last_modified_str: String,
}

/// How a beta manifest failure affects assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetaPolicy {
    /// Propagate the failure.
    Required,
    /// Log the failure and assemble without a beta manifest.
    BestEffort,
}

/// Renders freshness timestamps in an explicitly configured zone.
#[derive(Debug, Clone)]
pub struct DisplayClock {
    zone: DisplayZone,
    format: String,
}

impl DisplayClock {
    /// `format` must already be validated (see `RepogenConfig`).
    pub fn new(zone: DisplayZone, format: impl Into<String>) -> Self {
        Self {
            zone,
            format: format.into(),
        }
    }

    pub fn format(&self, timestamp: DateTime<Utc>) -> String {
        match self.zone {
            DisplayZone::Local => timestamp
                .with_timezone(&Local)
                .format(&self.format)
                .to_string(),
            DisplayZone::Utc => timestamp.format(&self.format).to_string(),
            DisplayZone::Fixed(offset) => timestamp
                .with_timezone(&offset)
                .format(&self.format)
                .to_string(),
        }
    }
}

/// A descriptor that could not be turned into a package.
#[derive(Debug)]
pub struct PackageFailure {
    pub package_id: String,
    pub file_name: String,
    pub error: RepogenError,
}

/// Outcome of listing a descriptor directory.
#[derive(Debug, Default)]
pub struct PackageListing {
    pub packages: Vec<PackageInfo>,
    pub failures: Vec<PackageFailure>,
}

impl PackageListing {
    /// Number of descriptors that were attempted.
    pub fn attempted(&self) -> usize {
        self.packages.len() + self.failures.len()
    }
}

/// Latest of the available timestamps.
pub fn latest_timestamp(
    package: &str,
    sources: &[Option<DateTime<Utc>>],
) -> Result<DateTime<Utc>> {
    sources
        .iter()
        .flatten()
        .max()
        .copied()
        .ok_or_else(|| RepogenError::NoTimestamp {
            package: package.to_string(),
        })
}

/// Reduce untrusted description HTML to the allow-listed subset.
pub fn sanitize_description(html: &str) -> String {
    let allowed: &[(&str, &[&str])] = &[
        ("a", &["href", "hreflang"]),
        ("bdo", &["dir"]),
        ("blockquote", &["cite"]),
        ("col", &["align", "char", "charoff", "span"]),
        ("colgroup", &["align", "char", "charoff", "span"]),
        ("del", &["cite", "datetime"]),
        ("h1", &["align"]),
        ("hr", &["align", "size", "width"]),
        ("img", &["align", "alt", "height", "src", "width"]),
        ("ins", &["cite", "datetime"]),
        ("ol", &["start"]),
        ("p", &["align"]),
        ("q", &["cite"]),
        ("table", &["align", "char", "charoff", "summary"]),
        ("tbody", &["align", "char", "charoff"]),
        (
            "td",
            &["align", "char", "charoff", "colspan", "headers", "rowspan"],
        ),
        ("tfoot", &["align", "char", "charoff"]),
        (
            "th",
            &["align", "char", "charoff", "colspan", "headers", "rowspan", "scope"],
        ),
        ("thead", &["align", "char", "charoff"]),
        ("tr", &["align", "char", "charoff"]),
    ];
    let attributes: HashMap<&str, HashSet<&str>> = allowed
        .iter()
        .map(|(tag, attrs)| (*tag, attrs.iter().copied().collect()))
        .collect();

    ammonia::Builder::default()
        .tag_attributes(attributes)
        .link_rel(None)
        .clean(html)
        .to_string()
}

/// Builds package records, resolving manifests through `resolver`.
pub struct PackageAssembler<'a, F: Fetcher> {
    resolver: ManifestResolver<'a, F>,
    clock: &'a DisplayClock,
    logger: &'a Logger,
    offline: bool,
}

impl<'a, F: Fetcher> PackageAssembler<'a, F> {
    pub fn new(
        resolver: ManifestResolver<'a, F>,
        clock: &'a DisplayClock,
        logger: &'a Logger,
        offline: bool,
    ) -> Self {
        Self {
            resolver,
            clock,
            logger,
            offline,
        }
    }

    /// Single-package entry point; every error propagates.
    pub async fn from_package_info_file(&self, path: &Path) -> Result<PackageInfo> {
        let (pkgid, content) = load_registry(path)?;
        self.from_package_info(&pkgid, content, BetaPolicy::Required)
            .await
    }

    pub async fn from_package_info(
        &self,
        pkgid: &str,
        content: PackageRegistry,
        beta: BetaPolicy,
    ) -> Result<PackageInfo> {
        self.logger
            .info("PARSE", format!("Parsing package info for {pkgid}"));
        let pool = content.pool.parse::<Pool>()?;
        let manifest_url = url_fixup(&content.manifest_url);
        let manifest_url_beta = content.manifest_url_beta.as_deref().map(url_fixup);

        let release = self
            .resolver
            .resolve(pkgid, Channel::Release, &manifest_url, self.offline)
            .await?;
        self.logger.debug(
            "MANIFEST",
            format!(
                "{pkgid} release {} via {:?}",
                release.manifest.version, release.origin
            ),
        );

        let beta_resolved = match manifest_url_beta.as_deref() {
            Some(uri) => match self
                .resolver
                .resolve(pkgid, Channel::Beta, uri, self.offline)
                .await
            {
                Ok(resolved) => Some(resolved),
                Err(err) if beta == BetaPolicy::BestEffort => {
                    self.logger.warn(
                        "BETA",
                        format!("Skipping beta manifest for {pkgid}: {err}"),
                    );
                    None
                }
                Err(err) => return Err(err),
            },
            None => None,
        };

        let last_modified = latest_timestamp(
            pkgid,
            &[
                Some(release.last_modified),
                beta_resolved.as_ref().map(|b| b.last_modified),
            ],
        )?;

        Ok(PackageInfo {
            id: pkgid.to_string(),
            title: content.title,
            icon_uri: content.icon_uri,
            manifest_url,
            manifest_url_beta,
            category: content.category,
            description: sanitize_description(&content.description),
            detail_icon_uri: content.detail_icon_uri,
            funding: content.funding,
            pool,
            requirements: content.requirements,
            manifest: release.manifest,
            manifest_beta: beta_resolved.map(|b| b.manifest),
            last_modified,
            last_modified_str: self.clock.format(last_modified),
        })
    }

    /// Assemble every descriptor in `pkgdir`, sorted by title.
    ///
    /// Descriptors whose id is not in `filter` are skipped before any
    /// parsing. Failing descriptors are logged and reported in
    /// [`PackageListing::failures`].
    pub async fn list_packages(
        &self,
        pkgdir: &Path,
        filter: Option<&HashSet<String>>,
    ) -> Result<PackageListing> {
        let mut listing = PackageListing::default();
        for path in descriptor_paths(pkgdir)? {
            let Some(pkgid) = package_id(&path) else {
                continue;
            };
            if filter.is_some_and(|wanted| !wanted.contains(&pkgid)) {
                continue;
            }
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            let outcome = match load_registry(&path) {
                Ok((pkgid, content)) => {
                    self.from_package_info(&pkgid, content, BetaPolicy::BestEffort)
                        .await
                }
                Err(err) => Err(err),
            };
            match outcome {
                Ok(info) => listing.packages.push(info),
                Err(error) => {
                    self.logger.warn(
                        "PKGFAIL",
                        format!("Error loading package info file {file_name}: {error}"),
                    );
                    listing.failures.push(PackageFailure {
                        package_id: pkgid,
                        file_name,
                        error,
                    });
                }
            }
        }
        listing.packages.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(listing)
    }
}

/// Regular files in `pkgdir`, in file-name order.
fn descriptor_paths(pkgdir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(pkgdir).map_err(|err| {
        RepogenError::Filesystem(format!(
            "Failed to read package directory {}: {err}",
            pkgdir.display()
        ))
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// A package record with a local manifest, for renderer tests.
    pub fn package(id: &str, title: &str) -> PackageInfo {
        let manifest: PackageManifest = serde_json::from_str(
            &crate::manifest::fixtures::manifest_json(id, "1.0.0", "https://cdn.example.org/a.ipk"),
        )
        .unwrap();
        let last_modified = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        PackageInfo {
            id: id.to_string(),
            title: title.to_string(),
            icon_uri: format!("https://example.org/{id}.png"),
            manifest_url: format!("https://example.org/{id}.manifest.json"),
            manifest_url_beta: None,
            category: "utilities".into(),
            description: "Some **markdown** text".into(),
            detail_icon_uri: None,
            funding: None,
            pool: Pool::Main,
            requirements: None,
            manifest,
            manifest_beta: None,
            last_modified,
            last_modified_str: "2024/05/01 12:00:00 UTC".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FetchCache;
    use crate::fetch::testing::FakeFetcher;
    use crate::manifest::fixtures::manifest_json;
    use chrono::{FixedOffset, TimeZone};
    use reqwest::Url;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    struct Workspace {
        temp: TempDir,
        cache: FetchCache,
        logger: Logger,
        clock: DisplayClock,
    }

    impl Workspace {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            std::fs::create_dir_all(temp.path().join("packages")).unwrap();
            std::fs::create_dir_all(temp.path().join("manifests")).unwrap();
            let cache = FetchCache::new(temp.path().join("cache"));
            Self {
                temp,
                cache,
                logger: Logger::quiet(),
                clock: DisplayClock::new(DisplayZone::Utc, "%Y/%m/%d %H:%M:%S %Z"),
            }
        }

        fn pkgdir(&self) -> PathBuf {
            self.temp.path().join("packages")
        }

        /// Write a local manifest with a pinned mtime and return its file URL.
        fn local_manifest(&self, id: &str, secs: u64) -> String {
            let path = self.temp.path().join("manifests").join(format!("{id}.json"));
            std::fs::write(&path, manifest_json(id, "1.0.0", "app.ipk")).unwrap();
            let when = UNIX_EPOCH + Duration::from_secs(secs);
            filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(when)).unwrap();
            Url::from_file_path(&path).unwrap().to_string()
        }

        fn descriptor(&self, id: &str, title: &str, pool: &str, manifest: &str) {
            let body = format!(
                "title: \"{title}\"\niconUri: icon.png\nmanifestUrl: \"{manifest}\"\n\
                 category: misc\npool: {pool}\ndescription: \"<p onclick='x()'>Hi</p>\"\n"
            );
            std::fs::write(self.pkgdir().join(format!("{id}.yml")), body).unwrap();
        }

        fn assembler<'a>(&'a self, fetcher: &'a FakeFetcher) -> PackageAssembler<'a, FakeFetcher> {
            let resolver = ManifestResolver::new(fetcher, &self.cache, &self.logger);
            PackageAssembler::new(resolver, &self.clock, &self.logger, false)
        }
    }

    fn registry(manifest_url: &str, beta: Option<&str>) -> PackageRegistry {
        PackageRegistry {
            title: "Demo".into(),
            icon_uri: "icon.png".into(),
            manifest_url: manifest_url.into(),
            manifest_url_beta: beta.map(str::to_string),
            category: "misc".into(),
            description: String::new(),
            pool: "main".into(),
            requirements: None,
            detail_icon_uri: None,
            funding: None,
        }
    }

    #[test]
    fn pool_accepts_only_known_values() {
        assert_eq!("main".parse::<Pool>().unwrap(), Pool::Main);
        assert_eq!("non-free".parse::<Pool>().unwrap(), Pool::NonFree);
        assert!(matches!(
            "free".parse::<Pool>().unwrap_err(),
            RepogenError::PoolClassifier { .. }
        ));
        assert_eq!(serde_json::to_string(&Pool::NonFree).unwrap(), "\"non-free\"");
    }

    #[test]
    fn latest_timestamp_ignores_absent_values() {
        let early = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(latest_timestamp("p", &[Some(early), Some(late)]).unwrap(), late);
        assert_eq!(latest_timestamp("p", &[None, Some(early)]).unwrap(), early);
        assert!(matches!(
            latest_timestamp("p", &[None, None]).unwrap_err(),
            RepogenError::NoTimestamp { .. }
        ));
    }

    #[test]
    fn sanitizer_degrades_to_allowed_subset() {
        let cleaned = sanitize_description(
            r#"<p align="center" onclick="evil()">Hi <a href="https://x.org" target="_blank">x</a></p><script>alert(1)</script>"#,
        );
        assert_eq!(
            cleaned,
            r#"<p align="center">Hi <a href="https://x.org">x</a></p>"#
        );
    }

    #[test]
    fn display_clock_uses_configured_zone() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let utc = DisplayClock::new(DisplayZone::Utc, "%Y/%m/%d %H:%M:%S %Z");
        assert_eq!(utc.format(ts), "2024/05/01 12:00:00 UTC");
        let plus8 = DisplayClock::new(
            DisplayZone::Fixed(FixedOffset::east_opt(8 * 3600).unwrap()),
            "%Y/%m/%d %H:%M",
        );
        assert_eq!(plus8.format(ts), "2024/05/01 20:00");
    }

    #[tokio::test]
    async fn listing_sorts_by_title_case_sensitively() {
        let ws = Workspace::new();
        for (id, title) in [("zed", "Zed App"), ("alpha", "alpha"), ("beta", "Beta")] {
            let uri = ws.local_manifest(id, 1_600_000_000);
            ws.descriptor(id, title, "main", &uri);
        }
        let fetcher = FakeFetcher::new();
        let listing = ws
            .assembler(&fetcher)
            .list_packages(&ws.pkgdir(), None)
            .await
            .unwrap();
        let titles: Vec<_> = listing.packages.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["Beta", "Zed App", "alpha"]);
        assert!(listing.failures.is_empty());
        assert_eq!(listing.packages[0].description, "<p>Hi</p>");
    }

    #[tokio::test]
    async fn equal_titles_keep_file_name_order() {
        let ws = Workspace::new();
        for id in ["b.second", "a.first"] {
            let uri = ws.local_manifest(id, 1_600_000_000);
            ws.descriptor(id, "Same", "main", &uri);
        }
        let fetcher = FakeFetcher::new();
        let listing = ws
            .assembler(&fetcher)
            .list_packages(&ws.pkgdir(), None)
            .await
            .unwrap();
        let ids: Vec<_> = listing.packages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a.first", "b.second"]);
    }

    #[tokio::test]
    async fn bad_descriptors_are_dropped_not_fatal() {
        let ws = Workspace::new();
        let good = ws.local_manifest("good", 1_600_000_000);
        ws.descriptor("good", "Good", "main", &good);
        let freeloader = ws.local_manifest("freeloader", 1_600_000_000);
        ws.descriptor("freeloader", "Free", "free", &freeloader);
        std::fs::write(ws.pkgdir().join("notes.txt"), "not a descriptor").unwrap();

        let fetcher = FakeFetcher::new();
        let listing = ws
            .assembler(&fetcher)
            .list_packages(&ws.pkgdir(), None)
            .await
            .unwrap();

        assert_eq!(listing.packages.len(), 1);
        assert_eq!(listing.packages[0].id, "good");
        assert_eq!(listing.attempted(), 3);
        let mut failed: Vec<_> = listing
            .failures
            .iter()
            .map(|f| f.file_name.as_str())
            .collect();
        failed.sort();
        assert_eq!(failed, ["freeloader.yml", "notes.txt"]);
        assert!(listing.failures.iter().any(|f| matches!(
            f.error,
            RepogenError::PoolClassifier { ref value } if value == "free"
        )));
    }

    #[tokio::test]
    async fn filter_skips_other_descriptors_before_resolution() {
        let ws = Workspace::new();
        let wanted = ws.local_manifest("wanted", 1_600_000_000);
        ws.descriptor("wanted", "Wanted", "main", &wanted);
        ws.descriptor("remote", "Remote", "main", "https://example.org/remote.json");

        let fetcher = FakeFetcher::new();
        let filter: HashSet<String> = ["wanted".to_string()].into_iter().collect();
        let listing = ws
            .assembler(&fetcher)
            .list_packages(&ws.pkgdir(), Some(&filter))
            .await
            .unwrap();

        assert_eq!(listing.packages.len(), 1);
        assert!(listing.failures.is_empty());
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn unreachable_release_fails_even_with_beta() {
        let ws = Workspace::new();
        let beta = ws.local_manifest("demo-beta", 1_600_000_000);
        let fetcher = FakeFetcher::new().unreachable("https://example.org/release.json");
        let err = ws
            .assembler(&fetcher)
            .from_package_info(
                "demo",
                registry("https://example.org/release.json", Some(&beta)),
                BetaPolicy::BestEffort,
            )
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn beta_failure_depends_on_policy() {
        let ws = Workspace::new();
        let release = ws.local_manifest("demo", 1_600_000_000);
        let fetcher = FakeFetcher::new().status("https://example.org/beta.json", 500);
        let assembler = ws.assembler(&fetcher);
        let content = registry(&release, Some("https://example.org/beta.json"));

        let info = assembler
            .from_package_info("demo", content.clone(), BetaPolicy::BestEffort)
            .await
            .unwrap();
        assert!(info.manifest_beta.is_none());

        let err = assembler
            .from_package_info("demo", content, BetaPolicy::Required)
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn aggregate_timestamp_is_newest_channel() {
        let ws = Workspace::new();
        let release = ws.local_manifest("demo", 1_600_000_000);
        let beta = ws.local_manifest("demo-beta", 1_700_000_000);
        let fetcher = FakeFetcher::new();
        let info = ws
            .assembler(&fetcher)
            .from_package_info("demo", registry(&release, Some(&beta)), BetaPolicy::Required)
            .await
            .unwrap();
        let expected = DateTime::<Utc>::from(UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        assert_eq!(info.last_modified, expected);
        assert_eq!(info.last_modified_str, "2023/11/14 22:13:20 UTC");
        assert!(info.manifest_beta.is_some());
    }

    #[tokio::test]
    async fn single_file_entry_point_propagates_errors() {
        let ws = Workspace::new();
        let uri = ws.local_manifest("demo", 1_600_000_000);
        ws.descriptor("demo", "Demo", "free", &uri);
        let fetcher = FakeFetcher::new();
        let err = ws
            .assembler(&fetcher)
            .from_package_info_file(&ws.pkgdir().join("demo.yml"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepogenError::PoolClassifier { .. }));
    }
}
