/*============================================================
  Synavera Project: Repogen
  Module: repogen::main
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Entry point for repogen. Reads a directory of package
    descriptors, resolves their manifests and emits the static
    JSON API or the HTML listing pages.

  Security / Safety Notes:
    Operates within user privileges. Performs HTTP GET/HEAD
    requests only and writes under operator-chosen paths.

  Dependencies:
    clap for CLI parsing, chrono for session stamps.

  Operational Scope:
    Invoked once per site build.

  Revision History:
    2025-03-02 COD  Authored repogen runtime.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Result-first error handling with deterministic exits
    - Structured logging following Synavera cadence
    - Configurable execution via CLI and config file
============================================================*/

mod apidata;
mod apppage;
mod cache;
mod config;
mod error;
mod fetch;
mod fsio;
mod logger;
mod manifest;
mod package_info;
mod registry;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};

use apidata::{ApiGenerator, ApiOptions};
use apppage::AppListingGenerator;
use cache::FetchCache;
use config::RepogenConfig;
use error::{RepogenError, Result};
use fetch::HttpFetcher;
use logger::Logger;
use manifest::ManifestResolver;
use package_info::{DisplayClock, PackageAssembler, PackageListing};

/// Command-line arguments for repogen.
#[derive(Debug, Parser)]
#[command(
    name = "repogen",
    version,
    about = "Static package repository generator"
)]
struct Cli {
    /// Override configuration file path.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Explicit log file path.
    #[arg(long, value_name = "PATH", global = true)]
    log: Option<PathBuf>,
    /// Never touch the network; remote manifests come from the cache.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    offline: bool,
    /// Enable verbose logging to stderr.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate the paginated JSON API.
    Api {
        /// Directory of package descriptors.
        #[arg(short, long, value_name = "DIR")]
        input_dir: PathBuf,
        /// API output directory (receives apps.json and apps/).
        #[arg(short, long, value_name = "DIR")]
        output_dir: PathBuf,
        /// Directory receiving re-hosted artifacts.
        #[arg(long, value_name = "DIR")]
        apps_dir: Option<PathBuf>,
        /// Re-host the artifact of this package (repeatable).
        #[arg(long = "host", value_name = "ID", action = ArgAction::Append)]
        host: Vec<String>,
        /// Limit generation to specific packages.
        #[arg(long = "package", value_name = "ID", action = ArgAction::Append)]
        packages: Vec<String>,
    },
    /// Generate HTML listing pages and Markdown detail pages.
    Pages {
        #[arg(short, long, value_name = "DIR")]
        input_dir: PathBuf,
        #[arg(short, long, value_name = "DIR")]
        output_dir: PathBuf,
        /// Skip per-package detail pages.
        #[arg(long, action = ArgAction::SetTrue)]
        no_details: bool,
        /// Skip listing pages.
        #[arg(long, action = ArgAction::SetTrue)]
        no_list: bool,
        #[arg(long = "package", value_name = "ID", action = ArgAction::Append)]
        packages: Vec<String>,
    },
    /// Resolve a single descriptor and print the assembled package.
    Show {
        #[arg(value_name = "DESCRIPTOR")]
        descriptor: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[repogen] {err}");
            err.exit_code()
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = RepogenConfig::load_from_optional_path(cli.config.as_deref())?;

    let session_stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let log_path = cli
        .log
        .clone()
        .unwrap_or_else(|| config.log_dir().join(format!("repogen_{session_stamp}.log")));
    let logger = Logger::new(Some(log_path), cli.verbose)?;
    logger.info("INIT", "repogen starting.");

    let fetcher = HttpFetcher::new(&config.http)?;
    let cache = FetchCache::new(config.cache_dir());
    logger.debug(
        "CACHE",
        format!("Manifest cache at {}", cache.root().display()),
    );
    let clock = DisplayClock::new(config.display_zone()?, config.display.timestamp_format.clone());
    let resolver = ManifestResolver::new(&fetcher, &cache, &logger);
    let assembler = PackageAssembler::new(resolver, &clock, &logger, cli.offline);
    if cli.offline {
        logger.info("OFFLINE", "Network disabled; using cached manifests.");
    }

    match cli.command {
        Command::Show { descriptor } => {
            let info = assembler.from_package_info_file(&descriptor).await?;
            let rendered = serde_json::to_string_pretty(&info).map_err(|err| {
                RepogenError::Serialization(format!("Failed to encode package: {err}"))
            })?;
            println!("{rendered}");
        }
        Command::Api {
            input_dir,
            output_dir,
            apps_dir,
            host,
            packages,
        } => {
            let mut listing = list(&assembler, &input_dir, &packages, &logger).await?;
            let mut host_packages: HashSet<String> =
                config.site.host_packages.iter().cloned().collect();
            host_packages.extend(host);
            let options = ApiOptions {
                api_dir: output_dir,
                apps_dir,
                host_packages,
                site_url: config.site.url.clone(),
                api_base: config.site.api_base.clone(),
                items_per_page: config.output.items_per_page,
            };
            ApiGenerator::new(&options, &fetcher, &logger)
                .generate(&mut listing.packages)
                .await?;
            println!(
                "Generated json data for {} packages.",
                listing.packages.len()
            );
        }
        Command::Pages {
            input_dir,
            output_dir,
            no_details,
            no_list,
            packages,
        } => {
            let listing = list(&assembler, &input_dir, &packages, &logger).await?;
            AppListingGenerator::new(&listing.packages, config.output.items_per_page, &logger)
                .generate(&output_dir, !no_details, !no_list)?;
            println!(
                "Generated application page for {} packages.",
                listing.packages.len()
            );
        }
    }

    logger.info(
        "COMPLETE",
        format!("Finished with {} warnings.", logger.warnings()),
    );
    logger.finalize()?;
    Ok(ExitCode::SUCCESS)
}

async fn list(
    assembler: &PackageAssembler<'_, HttpFetcher>,
    input_dir: &Path,
    requested: &[String],
    logger: &Logger,
) -> Result<PackageListing> {
    let filter: Option<HashSet<String>> =
        (!requested.is_empty()).then(|| requested.iter().cloned().collect());
    let listing = assembler.list_packages(input_dir, filter.as_ref()).await?;

    if let Some(wanted) = &filter {
        let mut missing: Vec<&str> = wanted
            .iter()
            .filter(|id| !listing.packages.iter().any(|pkg| &pkg.id == *id))
            .filter(|id| !listing.failures.iter().any(|f| &f.package_id == *id))
            .map(String::as_str)
            .collect();
        missing.sort_unstable();
        if !missing.is_empty() {
            logger.warn(
                "PKG404",
                format!("Requested packages not found: {}", missing.join(", ")),
            );
        }
    }

    logger.info(
        "SUMMARY",
        format!(
            "attempted={} packages={} failed={}",
            listing.attempted(),
            listing.packages.len(),
            listing.failures.len()
        ),
    );
    if listing.packages.is_empty() && !listing.failures.is_empty() {
        if let Some(first) = listing.failures.first() {
            logger.error(
                "NOGEN",
                format!(
                    "Every descriptor failed; first was {}: {}",
                    first.file_name, first.error
                ),
            );
        }
        return Err(RepogenError::NothingGenerated {
            failed: listing.failures.len(),
        });
    }
    Ok(listing)
}
