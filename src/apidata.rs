/*============================================================
  Synavera Project: Repogen
  Module: repogen::apidata
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Emit the paginated JSON API: apps.json, apps/{n}.json,
    per-package latest.json and full_description.html, plus
    copies of local manifests and optionally re-hosted ipks.

  Security / Safety Notes:
    Local manifest paths are rewritten to site-relative URLs so
    no filesystem path leaks into the API. Re-hosted artifacts
    are verified against their declared sha256.

  Dependencies:
    serde_json for output, pulldown-cmark for descriptions,
    sha2 for artifact verification.

  Operational Scope:
    Run after listing; consumes the sorted package list.

  Revision History:
    2025-03-02 COD  Authored JSON API generator.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic output for identical input
    - Atomic writes for every artifact
============================================================*/

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use pulldown_cmark::{html, Parser};
use reqwest::Url;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{RepogenError, Result};
use crate::fetch::Fetcher;
use crate::fsio;
use crate::logger::Logger;
use crate::manifest::PackageManifest;
use crate::package_info::{PackageInfo, Pool};
use crate::registry::PackageRequirements;

/// Paging block of an API page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    pub page: usize,
    pub count: usize,
    pub max_page: usize,
    pub items_total: usize,
}

/// Package entry as exposed by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPackage<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub icon_uri: &'a str,
    pub manifest_url: &'a str,
    pub manifest: &'a PackageManifest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_url_beta: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_beta: Option<&'a PackageManifest>,
    pub pool: Pool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_icon_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<&'a PackageRequirements>,
    pub short_description: Option<&'a str>,
    pub full_description_url: String,
}

#[derive(Debug, Serialize)]
struct ApiPage<'a> {
    paging: Paging,
    packages: Vec<ApiPackage<'a>>,
}

/// Where an API entry is rendered, which decides its description link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryContext {
    FirstPage,
    LaterPage,
    Details,
}

/// Number of pages needed for `total` items; never less than one.
pub fn max_page(total: usize, per_page: usize) -> usize {
    total.div_ceil(per_page.max(1)).max(1)
}

/// Project a package onto its API representation.
pub fn package_item(info: &PackageInfo, context: EntryContext) -> ApiPackage<'_> {
    let full_description_url = match context {
        EntryContext::Details => "../full_description.html".to_string(),
        EntryContext::LaterPage => format!("{}/full_description.html", info.id),
        EntryContext::FirstPage => format!("apps/{}/full_description.html", info.id),
    };
    ApiPackage {
        id: &info.id,
        title: &info.title,
        icon_uri: &info.icon_uri,
        manifest_url: &info.manifest_url,
        manifest: &info.manifest,
        manifest_url_beta: info.manifest_url_beta.as_deref(),
        manifest_beta: info.manifest_beta.as_ref(),
        pool: info.pool,
        detail_icon_uri: info.detail_icon_uri.as_deref(),
        requirements: info.requirements.as_ref(),
        short_description: info.manifest.app_description.as_deref(),
        full_description_url,
    }
}

/// Render a Markdown description to HTML.
pub fn render_description(markdown: &str) -> String {
    let mut out = String::new();
    html::push_html(&mut out, Parser::new(markdown));
    out
}

/// Options for API generation.
#[derive(Debug, Clone)]
pub struct ApiOptions {
    pub api_dir: PathBuf,
    /// Directory receiving re-hosted artifacts, required when `host_packages` is set.
    pub apps_dir: Option<PathBuf>,
    pub host_packages: HashSet<String>,
    pub site_url: String,
    pub api_base: String,
    pub items_per_page: usize,
}

/// Writes the JSON API for a package list.
pub struct ApiGenerator<'a, F: Fetcher> {
    options: &'a ApiOptions,
    fetcher: &'a F,
    logger: &'a Logger,
}

impl<'a, F: Fetcher> ApiGenerator<'a, F> {
    pub fn new(options: &'a ApiOptions, fetcher: &'a F, logger: &'a Logger) -> Self {
        Self {
            options,
            fetcher,
            logger,
        }
    }

    fn apps_dir(&self) -> PathBuf {
        self.options.api_dir.join("apps")
    }

    /// Generate every API artifact. Packages are rewritten in place when
    /// their manifest URL or artifact location changes.
    pub async fn generate(&self, packages: &mut [PackageInfo]) -> Result<()> {
        let per_page = self.options.items_per_page.max(1);
        let total = packages.len();
        let max_page = max_page(total, per_page);

        if packages.is_empty() {
            self.save_page(1, max_page, total, &[])?;
        }
        for (index, chunk) in packages.chunks_mut(per_page).enumerate() {
            for item in chunk.iter_mut() {
                self.write_package(item).await?;
            }
            self.save_page(index + 1, max_page, total, chunk)?;
        }

        self.logger.info(
            "API",
            format!("Generated json data for {total} packages."),
        );
        Ok(())
    }

    async fn write_package(&self, item: &mut PackageInfo) -> Result<()> {
        let app_dir = self.apps_dir().join(&item.id);
        if self.options.host_packages.contains(&item.id) {
            self.save_ipk(item).await?;
        }
        self.fix_manifest_url(item, &app_dir)?;
        fsio::write_json(
            &app_dir.join("releases").join("latest.json"),
            &package_item(item, EntryContext::Details),
        )?;
        fsio::write_atomic(
            &app_dir.join("full_description.html"),
            render_description(&item.description).as_bytes(),
        )
    }

    fn save_page(
        &self,
        page: usize,
        max_page: usize,
        total: usize,
        items: &[PackageInfo],
    ) -> Result<()> {
        let (path, context) = if page > 1 {
            (
                self.apps_dir().join(format!("{page}.json")),
                EntryContext::LaterPage,
            )
        } else {
            (self.options.api_dir.join("apps.json"), EntryContext::FirstPage)
        };
        let document = ApiPage {
            paging: Paging {
                page,
                count: items.len(),
                max_page,
                items_total: total,
            },
            packages: items.iter().map(|item| package_item(item, context)).collect(),
        };
        fsio::write_json_pretty(&path, &document)
    }

    /// Copy `file://` manifests into the API tree and point at the copies.
    /// Beta manifests live under `manifests/beta/` so a shared version
    /// number never overwrites the release copy.
    fn fix_manifest_url(&self, item: &mut PackageInfo, app_dir: &Path) -> Result<()> {
        if let Some(url) =
            self.relink_local(&item.id, &item.manifest_url, &item.manifest, app_dir, "")?
        {
            item.manifest_url = url;
        }
        let relinked_beta = match (&item.manifest_url_beta, &item.manifest_beta) {
            (Some(beta_url), Some(beta)) => {
                self.relink_local(&item.id, beta_url, beta, app_dir, "beta/")?
            }
            _ => None,
        };
        if relinked_beta.is_some() {
            item.manifest_url_beta = relinked_beta;
        }
        Ok(())
    }

    fn relink_local(
        &self,
        id: &str,
        manifest_url: &str,
        manifest: &PackageManifest,
        app_dir: &Path,
        subdir: &str,
    ) -> Result<Option<String>> {
        let is_local = Url::parse(manifest_url)
            .map(|url| url.scheme() == "file")
            .unwrap_or(false);
        if !is_local {
            return Ok(None);
        }
        let relative = format!("manifests/{subdir}{}.json", manifest.version);
        fsio::write_json(&app_dir.join(&relative), manifest)?;
        Ok(Some(format!(
            "{}/apps/{id}/{relative}",
            self.options.api_base.trim_end_matches('/')
        )))
    }

    /// Download the release artifact into the site and point `ipkUrl` at it.
    async fn save_ipk(&self, item: &mut PackageInfo) -> Result<()> {
        let Some(apps_dir) = self.options.apps_dir.as_deref() else {
            return Err(RepogenError::Config(format!(
                "Package {} is hosted locally but no apps directory was given",
                item.id
            )));
        };
        let site_url = self.options.site_url.trim_end_matches('/');
        let manifest = &mut item.manifest;
        if !site_url.is_empty() && manifest.ipk_url.starts_with(site_url) {
            return Ok(());
        }

        let sha256 = manifest.ipk_hash.sha256.to_ascii_lowercase();
        let file_name = format!("{sha256}.ipk");
        let target = apps_dir.join(&item.id).join("releases").join(&file_name);
        let url = Url::parse(&manifest.ipk_url)
            .map_err(|err| RepogenError::malformed(&manifest.ipk_url, err))?;
        let bytes = self.fetcher.download(&url).await?;
        let digest = format!("{:x}", Sha256::digest(&bytes));
        if digest != sha256 {
            return Err(RepogenError::Integrity(format!(
                "{} has sha256 {digest}, manifest declares {sha256}",
                manifest.ipk_url
            )));
        }
        fsio::write_atomic(&target, &bytes)?;

        let apps_segment = apps_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        manifest.ipk_url = format!(
            "{site_url}/{apps_segment}/{}/releases/{file_name}",
            item.id
        );
        self.logger.info(
            "HOST",
            format!("Re-hosted {} artifact at {}", item.id, manifest.ipk_url),
        );
        Ok(())
    }
}
