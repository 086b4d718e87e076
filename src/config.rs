/*============================================================
  Synavera Project: Repogen
  Module: repogen::config
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Load generator configuration from an optional TOML file and
    fill unset values with platform defaults.

  Security / Safety Notes:
    Reads operator-controlled files only. No secrets are stored.

  Dependencies:
    toml + serde for parsing, dirs for platform directories,
    chrono for validating the display zone and format.

  Operational Scope:
    Consumed once by the entry point; the resulting values are
    threaded explicitly into the resolver and renderers.

  Revision History:
    2025-03-02 COD  Introduced repogen configuration layer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit defaults, validated at load time
    - No ambient process state (locale, timezone)
============================================================*/

use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::FixedOffset;
use serde::Deserialize;

use crate::error::{RepogenError, Result};

const APP_DIR: &str = "repogen";
const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S %Z";

/// Root configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepogenConfig {
    pub paths: PathsConfig,
    pub http: HttpConfig,
    pub site: SiteConfig,
    pub output: OutputConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub cache_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    pub timeout: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            user_agent: format!("repogen/{} (linux)", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Public root of the generated site, used for re-hosted artifacts.
    pub url: String,
    /// URL prefix under which the API directory is served.
    pub api_base: String,
    /// Package ids whose installable artifacts are re-hosted.
    pub host_packages: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_base: "/api".into(),
            host_packages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub items_per_page: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { items_per_page: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    /// `local`, `utc`, or a fixed offset such as `+08:00`.
    pub timezone: String,
    pub timestamp_format: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: "local".into(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.into(),
        }
    }
}

/// Time zone used when rendering freshness timestamps for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayZone {
    Local,
    Utc,
    Fixed(FixedOffset),
}

impl RepogenConfig {
    /// Load configuration from `path`, the default location, or defaults.
    pub fn load_from_optional_path(path: Option<&Path>) -> Result<Self> {
        let candidate = match path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(RepogenError::Config(format!(
                        "Configuration file {} does not exist",
                        explicit.display()
                    )));
                }
                Some(explicit.to_path_buf())
            }
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR).join("config.toml"))
                .filter(|default| default.exists()),
        };

        let config = match candidate {
            Some(file) => {
                let raw = std::fs::read_to_string(&file).map_err(|err| {
                    RepogenError::Config(format!("Failed to read {}: {err}", file.display()))
                })?;
                Self::from_toml(&raw).map_err(|err| match err {
                    RepogenError::Config(msg) => {
                        RepogenError::Config(format!("{}: {msg}", file.display()))
                    }
                    other => other,
                })?
            }
            None => Self::default(),
        };
        Ok(config)
    }

    /// Parse and validate a TOML configuration document.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|err| RepogenError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.http.timeout == 0 {
            return Err(RepogenError::Config("http.timeout must be at least 1".into()));
        }
        if self.output.items_per_page == 0 {
            return Err(RepogenError::Config(
                "output.items_per_page must be at least 1".into(),
            ));
        }
        let url = &self.site.url;
        if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(RepogenError::Config(
                "site.url must start with http:// or https://".into(),
            ));
        }
        if StrftimeItems::new(&self.display.timestamp_format).any(|item| item == Item::Error) {
            return Err(RepogenError::Config(format!(
                "Invalid display.timestamp_format `{}`",
                self.display.timestamp_format
            )));
        }
        self.display_zone()?;
        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.paths.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_DIR)
        })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.paths.log_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_DIR)
                .join("logs")
        })
    }

    pub fn display_zone(&self) -> Result<DisplayZone> {
        parse_zone(&self.display.timezone)
    }
}

fn parse_zone(raw: &str) -> Result<DisplayZone> {
    let value = raw.trim();
    match value.to_ascii_lowercase().as_str() {
        "local" => return Ok(DisplayZone::Local),
        "utc" | "z" => return Ok(DisplayZone::Utc),
        _ => {}
    }
    let invalid = || RepogenError::Config(format!("Invalid display.timezone `{raw}`"));
    let (sign, rest) = if let Some(rest) = value.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = value.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(invalid());
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .map(DisplayZone::Fixed)
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = RepogenConfig::from_toml("").unwrap();
        assert_eq!(config.http.timeout, 30);
        assert_eq!(config.output.items_per_page, 10);
        assert_eq!(config.site.api_base, "/api");
        assert_eq!(config.display_zone().unwrap(), DisplayZone::Local);
    }

    #[test]
    fn parses_all_sections() {
        let config = RepogenConfig::from_toml(
            r#"
            [paths]
            cache_dir = "/var/cache/repo"

            [http]
            timeout = 5

            [site]
            url = "https://repo.example.org"
            host_packages = ["org.example.app"]

            [output]
            items_per_page = 25

            [display]
            timezone = "+08:00"
            timestamp_format = "%Y-%m-%d"
            "#,
        )
        .unwrap();
        assert_eq!(config.cache_dir(), PathBuf::from("/var/cache/repo"));
        assert_eq!(config.http.timeout, 5);
        assert_eq!(config.site.host_packages, vec!["org.example.app"]);
        assert_eq!(config.output.items_per_page, 25);
        assert_eq!(
            config.display_zone().unwrap(),
            DisplayZone::Fixed(FixedOffset::east_opt(8 * 3600).unwrap())
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(RepogenConfig::from_toml("[http]\ntimeout = 0").is_err());
        assert!(RepogenConfig::from_toml("[output]\nitems_per_page = 0").is_err());
        assert!(RepogenConfig::from_toml("[site]\nurl = \"ftp://x\"").is_err());
        assert!(RepogenConfig::from_toml("[display]\ntimezone = \"Mars/Olympus\"").is_err());
        assert!(RepogenConfig::from_toml("[display]\ntimestamp_format = \"%Q\"").is_err());
        assert!(RepogenConfig::from_toml("[unknown]\nkey = 1").is_err());
    }

    #[test]
    fn negative_offsets_parse() {
        assert_eq!(
            parse_zone("-05:30").unwrap(),
            DisplayZone::Fixed(FixedOffset::west_opt(5 * 3600 + 30 * 60).unwrap())
        );
        assert_eq!(parse_zone("UTC").unwrap(), DisplayZone::Utc);
    }

    #[test]
    fn out_of_range_offsets_are_rejected() {
        for raw in ["+999999", "-999999:00", "+24:00", "+05:60", "+-5"] {
            assert!(
                matches!(parse_zone(raw), Err(RepogenError::Config(_))),
                "{raw}"
            );
        }
        assert!(parse_zone("+23:59").is_ok());
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = RepogenConfig::load_from_optional_path(Some(Path::new(
            "/nonexistent/repogen/config.toml",
        )))
        .unwrap_err();
        assert!(matches!(err, RepogenError::Config(_)));
    }
}
