/*============================================================
  Synavera Project: Repogen
  Module: repogen::error
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Centralise repogen error kinds so descriptor, manifest and
    output failures carry consistent diagnostics and exit codes.

  Security / Safety Notes:
    Errors reference descriptor names, URIs and output paths
    only; response bodies are never embedded.

  Dependencies:
    thiserror for ergonomic error definitions.

  Operational Scope:
    Used across modules; the listing loop inspects the kind to
    decide whether a package is dropped, and the manifest
    resolver uses it to decide on cache fallback.

  Revision History:
    2025-03-02 COD  Established repogen error taxonomy.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit error taxonomy with actionable context
    - No silent failure paths
    - Stable exit codes for operational tooling
============================================================*/

use std::io;
use std::process::ExitCode;

use thiserror::Error;

/// Result alias for repogen operations.
pub type Result<T> = std::result::Result<T, RepogenError>;

/// Enumerates the error domains surfaced while building a repository.
#[derive(Debug, Error)]
pub enum RepogenError {
    #[error("Unrecognized descriptor format `{extension}` for {path}")]
    UnsupportedFormat { path: String, extension: String },
    #[error("Descriptor validation failed at {path}: {message}")]
    Validation { path: String, message: String },
    #[error("Cannot read local manifest {path}: {reason}")]
    ManifestRead { path: String, reason: String },
    #[error("Malformed manifest response from {uri}: {reason}")]
    MalformedResponse { uri: String, reason: String },
    #[error("Transport failure for {uri}: {reason}")]
    Transport { uri: String, reason: String },
    #[error("No manifest timestamp available for package {package}")]
    NoTimestamp { package: String },
    #[error("Unknown pool type `{value}`")]
    PoolClassifier { value: String },
    #[error("Integrity: {0}")]
    Integrity(String),
    #[error("Configuration: {0}")]
    Config(String),
    #[error("Serialization: {0}")]
    Serialization(String),
    #[error("Filesystem: {0}")]
    Filesystem(String),
    #[error("No packages generated: all {failed} descriptors failed")]
    NothingGenerated { failed: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RepogenError {
    /// Transport failures are the only kind the manifest cache may paper over.
    pub fn is_transport(&self) -> bool {
        matches!(self, RepogenError::Transport { .. })
    }

    pub(crate) fn transport(uri: impl Into<String>, reason: impl ToString) -> Self {
        RepogenError::Transport {
            uri: uri.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(uri: impl Into<String>, reason: impl ToString) -> Self {
        RepogenError::MalformedResponse {
            uri: uri.into(),
            reason: reason.to_string(),
        }
    }

    /// Map error category to a deterministic exit code.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            RepogenError::UnsupportedFormat { .. } => ExitCode::from(12),
            RepogenError::Validation { .. } => ExitCode::from(13),
            RepogenError::PoolClassifier { .. } => ExitCode::from(14),
            RepogenError::Config(_) => ExitCode::from(20),
            RepogenError::Transport { .. } => ExitCode::from(30),
            RepogenError::MalformedResponse { .. } => ExitCode::from(31),
            RepogenError::Serialization(_) => ExitCode::from(32),
            RepogenError::ManifestRead { .. } => ExitCode::from(33),
            RepogenError::Integrity(_) => ExitCode::from(34),
            RepogenError::Filesystem(_) => ExitCode::from(40),
            RepogenError::Io(_) => ExitCode::from(41),
            RepogenError::NoTimestamp { .. } => ExitCode::from(50),
            RepogenError::NothingGenerated { .. } => ExitCode::from(60),
        }
    }
}
