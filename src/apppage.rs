/*============================================================
  Synavera Project: Repogen
  Module: repogen::apppage
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Emit the paginated HTML app listing (apps-page-{n}.html)
    and per-package Markdown detail pages ({id}.md).

  Security / Safety Notes:
    All descriptor-derived text is HTML-escaped; descriptions
    are already sanitized by the assembler.

  Dependencies:
    None beyond std; writes go through fsio.

  Operational Scope:
    Run after listing; consumes the sorted package list.

  Revision History:
    2025-03-02 COD  Authored listing page generator.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Navigation model computed separately from markup
    - Deterministic output for identical input
============================================================*/

use std::fmt::Write as _;
use std::path::Path;

use crate::apidata::max_page;
use crate::error::Result;
use crate::fsio;
use crate::logger::Logger;
use crate::package_info::PackageInfo;

/// Pages on each side of the current page shown in the strip.
const NAV_RADIUS: i64 = 4;

/// One numbered link in the pagination strip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavItem {
    pub page: usize,
    pub path: String,
    pub current: bool,
}

/// Navigation state for one listing page; `None` entries are ellipses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub max_page: usize,
    pub prev_path: Option<String>,
    pub next_path: Option<String>,
    pub page_links: Vec<Option<NavItem>>,
}

fn nav_path(page: usize) -> String {
    if page == 1 {
        "apps".into()
    } else {
        format!("apps/page/{page}")
    }
}

fn page_path(page: usize) -> String {
    if page == 1 {
        "apps/index.html".into()
    } else {
        format!("apps/page/{page}.html")
    }
}

fn nav_item(page: usize, current: usize) -> NavItem {
    NavItem {
        page,
        path: nav_path(page),
        current: page == current,
    }
}

impl Pagination {
    /// Build the strip for `page` of `max_page`: a window of pages around
    /// the current one. The first and last page are pinned behind an
    /// ellipsis only when the window does not reach them; the pinned link
    /// takes the place of the window's outermost page on that side.
    pub fn new(page: usize, max_page: usize) -> Self {
        let (current, last) = (page as i64, max_page as i64);
        let mut start = current - NAV_RADIUS;
        let mut end = current + NAV_RADIUS;
        if start < 1 {
            end = end + 1 - start;
            start = 1;
        }
        end = end.min(last);

        let mut page_links: Vec<Option<NavItem>> = (start..=end)
            .map(|p| Some(nav_item(p as usize, page)))
            .collect();
        if start > 1 {
            page_links.remove(0);
            page_links.splice(0..0, [Some(nav_item(1, page)), None]);
        }
        if end < last {
            page_links.pop();
            page_links.extend([None, Some(nav_item(max_page, page))]);
        }

        Self {
            page,
            max_page,
            prev_path: (page > 1).then(|| nav_path(page - 1)),
            next_path: (page < max_page).then(|| nav_path(page + 1)),
            page_links,
        }
    }
}

/// Generates listing and detail pages.
pub struct AppListingGenerator<'a> {
    packages: &'a [PackageInfo],
    items_per_page: usize,
    logger: &'a Logger,
}

impl<'a> AppListingGenerator<'a> {
    pub fn new(packages: &'a [PackageInfo], items_per_page: usize, logger: &'a Logger) -> Self {
        Self {
            packages,
            items_per_page: items_per_page.max(1),
            logger,
        }
    }

    pub fn gen_details(&self, outdir: &Path) -> Result<()> {
        for pkg in self.packages {
            fsio::write_atomic(
                &outdir.join(format!("{}.md", pkg.id)),
                render_details(pkg).as_bytes(),
            )?;
        }
        Ok(())
    }

    pub fn gen_list(&self, outdir: &Path) -> Result<()> {
        let max_page = max_page(self.packages.len(), self.items_per_page);
        for (index, items) in self.packages.chunks(self.items_per_page).enumerate() {
            let pagination = Pagination::new(index + 1, max_page);
            fsio::write_atomic(
                &outdir.join(format!("apps-page-{}.html", pagination.page)),
                render_list_page(items, &pagination).as_bytes(),
            )?;
        }
        Ok(())
    }

    /// Run the selected generators and log the summary.
    pub fn generate(&self, outdir: &Path, details: bool, list: bool) -> Result<()> {
        if details {
            self.gen_details(outdir)?;
        }
        if list {
            self.gen_list(outdir)?;
        }
        self.logger.info(
            "PAGES",
            format!(
                "Generated application page for {} packages.",
                self.packages.len()
            ),
        );
        Ok(())
    }
}

fn render_details(pkg: &PackageInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "---");
    let _ = writeln!(out, "title: {}", yaml_quote(&pkg.title));
    let _ = writeln!(out, "package_id: {}", pkg.id);
    let _ = writeln!(out, "version: {}", yaml_quote(&pkg.manifest.version));
    let _ = writeln!(out, "category: {}", yaml_quote(&pkg.category));
    let _ = writeln!(out, "pool: {}", pkg.pool);
    let _ = writeln!(
        out,
        "icon: {}",
        yaml_quote(pkg.detail_icon_uri.as_deref().unwrap_or(&pkg.icon_uri))
    );
    let _ = writeln!(out, "last_modified: {}", yaml_quote(&pkg.last_modified_str));
    if let Some(beta) = &pkg.manifest_beta {
        let _ = writeln!(out, "beta_version: {}", yaml_quote(&beta.version));
    }
    if let Some(source) = &pkg.manifest.source_url {
        let _ = writeln!(out, "source: {}", yaml_quote(source));
    }
    let _ = writeln!(out, "---");
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", pkg.description.trim_end());
    out
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn yaml_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn render_list_page(items: &[PackageInfo], pagination: &Pagination) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "<section class=\"app-list\" data-page-path=\"{}\">",
        page_path(pagination.page)
    );
    for pkg in items {
        let summary = pkg.manifest.app_description.as_deref().unwrap_or_default();
        let _ = writeln!(out, "  <a class=\"app-card\" href=\"apps/{}\">", escape_html(&pkg.id));
        let _ = writeln!(
            out,
            "    <img src=\"{}\" alt=\"\" loading=\"lazy\">",
            escape_html(&pkg.icon_uri)
        );
        let _ = writeln!(out, "    <h3>{}</h3>", escape_html(&pkg.title));
        let _ = writeln!(
            out,
            "    <span class=\"version\">{}</span>",
            escape_html(&pkg.manifest.version)
        );
        let _ = writeln!(out, "    <p>{}</p>", escape_html(summary));
        let _ = writeln!(
            out,
            "    <time>{}</time>",
            escape_html(&pkg.last_modified_str)
        );
        let _ = writeln!(out, "  </a>");
    }
    let _ = writeln!(out, "</section>");
    render_pagination(&mut out, pagination);
    out
}

fn render_pagination(out: &mut String, pagination: &Pagination) {
    let _ = writeln!(out, "<nav class=\"pagination\">");
    if let Some(prev) = &pagination.prev_path {
        let _ = writeln!(out, "  <a class=\"prev\" href=\"/{prev}\">&laquo;</a>");
    }
    for link in &pagination.page_links {
        match link {
            Some(item) if item.current => {
                let _ = writeln!(out, "  <span class=\"current\">{}</span>", item.page);
            }
            Some(item) => {
                let _ = writeln!(out, "  <a href=\"/{}\">{}</a>", item.path, item.page);
            }
            None => {
                let _ = writeln!(out, "  <span class=\"ellipsis\">&hellip;</span>");
            }
        }
    }
    if let Some(next) = &pagination.next_path {
        let _ = writeln!(out, "  <a class=\"next\" href=\"/{next}\">&raquo;</a>");
    }
    let _ = writeln!(out, "</nav>");
}
