/*============================================================
  Synavera Project: Repogen
  Module: repogen::registry
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Load package descriptors (YAML or declarative TOML) into
    raw registry records and validate them against the
    PackageInfo schema.

  Security / Safety Notes:
    Descriptors are parsed as data only; nothing is evaluated.

  Dependencies:
    serde_yaml and toml for parsing, jsonschema for validation.

  Operational Scope:
    First stage of every listing and of single-package runs.

  Revision History:
    2025-03-02 COD  Authored descriptor loader.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Closed set of formats, unknown extensions rejected
    - Validation errors name the offending field path
============================================================*/

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RepogenError, Result};

const PACKAGE_INFO_SCHEMA: &str = include_str!("../schemas/PackageInfo.json");

/// Device requirements a package declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRequirements {
    #[serde(rename = "webosRelease", default, skip_serializing_if = "Option::is_none")]
    pub webos_release: Option<String>,
    #[serde(rename = "deviceSoC", default, skip_serializing_if = "Option::is_none")]
    pub device_soc: Option<Vec<String>>,
}

/// Raw descriptor contents, as authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRegistry {
    pub title: String,
    pub icon_uri: String,
    pub manifest_url: String,
    #[serde(default)]
    pub manifest_url_beta: Option<String>,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub pool: String,
    #[serde(default)]
    pub requirements: Option<PackageRequirements>,
    #[serde(default)]
    pub detail_icon_uri: Option<String>,
    #[serde(default)]
    pub funding: Option<BTreeMap<String, Vec<String>>>,
}

/// Supported descriptor encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFormat {
    Yaml,
    Toml,
}

impl DescriptorFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        match extension.as_str() {
            "yml" | "yaml" => Ok(DescriptorFormat::Yaml),
            "toml" => Ok(DescriptorFormat::Toml),
            _ => Err(RepogenError::UnsupportedFormat {
                path: path.display().to_string(),
                extension: format!(".{extension}"),
            }),
        }
    }

    fn parse(self, path: &Path, text: &str) -> Result<Value> {
        let parsed = match self {
            DescriptorFormat::Yaml => serde_yaml::from_str::<Value>(text).map_err(|e| e.to_string()),
            DescriptorFormat::Toml => toml::from_str::<Value>(text).map_err(|e| e.to_string()),
        };
        parsed.map_err(|reason| {
            RepogenError::Serialization(format!(
                "Failed to parse descriptor {}: {reason}",
                path.display()
            ))
        })
    }
}

/// Package id for a descriptor path: the file stem.
pub fn package_id(path: &Path) -> Option<String> {
    path.file_stem().map(|stem| stem.to_string_lossy().into_owned())
}

/// Load and validate a descriptor, returning its package id and record.
pub fn load_registry(path: &Path) -> Result<(String, PackageRegistry)> {
    let format = DescriptorFormat::from_path(path)?;
    let pkgid = package_id(path).ok_or_else(|| RepogenError::UnsupportedFormat {
        path: path.display().to_string(),
        extension: String::new(),
    })?;
    let text = std::fs::read_to_string(path).map_err(|err| {
        RepogenError::Filesystem(format!(
            "Failed to read descriptor {}: {err}",
            path.display()
        ))
    })?;
    let value = format.parse(path, &text)?;
    Ok((pkgid, validate_registry(value)?))
}

/// Validate a raw descriptor value and convert it into a record.
pub fn validate_registry(value: Value) -> Result<PackageRegistry> {
    let schema = package_info_schema()?;
    if let Err(mut errors) = schema.validate(&value) {
        if let Some(first) = errors.next() {
            let path = first.instance_path.to_string();
            return Err(RepogenError::Validation {
                path: if path.is_empty() { "/".into() } else { path },
                message: first.to_string(),
            });
        }
    }
    serde_json::from_value(value).map_err(|err| RepogenError::Validation {
        path: "/".into(),
        message: err.to_string(),
    })
}

fn package_info_schema() -> Result<&'static JSONSchema> {
    static SCHEMA: OnceLock<std::result::Result<JSONSchema, String>> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            let document: Value =
                serde_json::from_str(PACKAGE_INFO_SCHEMA).map_err(|err| err.to_string())?;
            JSONSchema::compile(&document).map_err(|err| err.to_string())
        })
        .as_ref()
        .map_err(|reason| RepogenError::Config(format!("PackageInfo schema is invalid: {reason}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const YAML: &str = r#"
title: Demo App
iconUri: https://example.org/icon.png
manifestUrl: https://example.org/demo.manifest.json
category: utilities
description: |
  <p>Does things.</p>
pool: main
requirements:
  webosRelease: ">=4.0"
  deviceSoC: [m16p, lm21u]
funding:
  github: [someone]
"#;

    const TOML: &str = r#"
title = "Toml App"
iconUri = "icon.png"
manifestUrl = "file:///srv/manifests/toml.json"
manifestUrlBeta = "https://example.org/beta.json"
category = "games"
pool = "non-free"
"#;

    fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_yaml_descriptor() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "org.example.demo.yml", YAML);
        let (id, record) = load_registry(&path).unwrap();
        assert_eq!(id, "org.example.demo");
        assert_eq!(record.title, "Demo App");
        assert_eq!(record.pool, "main");
        let requirements = record.requirements.unwrap();
        assert_eq!(requirements.webos_release.as_deref(), Some(">=4.0"));
        assert_eq!(requirements.device_soc.unwrap(), vec!["m16p", "lm21u"]);
        assert_eq!(record.funding.unwrap()["github"], vec!["someone"]);
    }

    #[test]
    fn loads_toml_descriptor() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "toml.app.toml", TOML);
        let (id, record) = load_registry(&path).unwrap();
        assert_eq!(id, "toml.app");
        assert_eq!(record.description, "");
        assert_eq!(
            record.manifest_url_beta.as_deref(),
            Some("https://example.org/beta.json")
        );
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "legacy.py", "def load(): return {}");
        let err = load_registry(&path).unwrap_err();
        assert!(matches!(
            err,
            RepogenError::UnsupportedFormat { ref extension, .. } if extension == ".py"
        ));
    }

    #[test]
    fn validation_names_offending_field() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "bad.yml", &YAML.replace("title: Demo App", "title: 42"));
        match load_registry(&path).unwrap_err() {
            RepogenError::Validation { path, .. } => assert_eq!(path, "/title"),
            other => panic!("unexpected error {other}"),
        }

        let nested = YAML.replace("deviceSoC: [m16p, lm21u]", "deviceSoC: [m16p, 7]");
        let path = write(&dir, "nested.yml", &nested);
        match load_registry(&path).unwrap_err() {
            RepogenError::Validation { path, .. } => {
                assert_eq!(path, "/requirements/deviceSoC/1")
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn validation_reports_missing_required_field() {
        let dir = TempDir::new().unwrap();
        let body = YAML.replace("pool: main\n", "");
        let path = write(&dir, "nopool.yml", &body);
        match load_registry(&path).unwrap_err() {
            RepogenError::Validation { message, .. } => assert!(message.contains("pool")),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn unparseable_descriptor_is_a_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "broken.toml", "title = ");
        assert!(matches!(
            load_registry(&path).unwrap_err(),
            RepogenError::Serialization(_)
        ));
    }
}
