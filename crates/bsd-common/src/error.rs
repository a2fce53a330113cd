//! Error types for beam summary processing.
//!
//! Every failure aborts the whole run, so errors carry enough context (file
//! path, DIF index, parse message) to diagnose without re-running.
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Topology Error
//!   Reason: topology error: not a JSON topology (...) and not a Pyrame XML file (...)
//!   Fix: Pass a JSON DIF→chip map or the path of a readable Pyrame XML configuration.
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 41,
//!   "category": "version",
//!   "message": "format version mismatch: expected p06, input declares v01",
//!   "context": { "expected": "p06", "actual": "v01" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for beam summary operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Input file and DIF selection errors.
    Input,
    /// Detector topology errors.
    Topology,
    /// Spill table open/read errors.
    Stream,
    /// Beam summary format version errors.
    Version,
    /// Configuration file errors.
    Config,
    /// Output sink and filesystem errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Input => write!(f, "input"),
            ErrorCategory::Topology => write!(f, "topology"),
            ErrorCategory::Stream => write!(f, "stream"),
            ErrorCategory::Version => write!(f, "version"),
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for beam summary processing.
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (10-19)
    #[error("input file not found or not a spill table: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("DIF {dif} is out of range (the detector has {n_difs} DIFs)")]
    InvalidDif { dif: u32, n_difs: u32 },

    // Topology errors (20-29)
    #[error("topology error: {0}")]
    Topology(String),

    #[error("DIF {dif} is not present in the topology")]
    UnknownDif { dif: u32 },

    // Stream errors (30-39)
    #[error("failed to open spill table {} for DIF {dif}: {message}", path.display())]
    StreamOpen {
        path: PathBuf,
        dif: u32,
        message: String,
    },

    #[error("failed to read entry {entry} of {}: {message}", path.display())]
    StreamRead {
        path: PathBuf,
        entry: usize,
        message: String,
    },

    // Version errors (40-49)
    #[error("unsupported beam summary format version: {version}")]
    UnsupportedVersion { version: String },

    #[error("format version mismatch: expected {expected}, input declares {actual}")]
    VersionMismatch { expected: String, actual: String },

    // Configuration errors (50-59)
    #[error("configuration error: {0}")]
    Config(String),

    // I/O errors (60-69)
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the stable error code for this error type.
    ///
    /// - 10-19: Input errors
    /// - 20-29: Topology errors
    /// - 30-39: Stream errors
    /// - 40-49: Version errors
    /// - 50-59: Configuration errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::InputNotFound { .. } => 10,
            Error::InvalidDif { .. } => 11,
            Error::Topology(_) => 20,
            Error::UnknownDif { .. } => 21,
            Error::StreamOpen { .. } => 30,
            Error::StreamRead { .. } => 31,
            Error::UnsupportedVersion { .. } => 40,
            Error::VersionMismatch { .. } => 41,
            Error::Config(_) => 50,
            Error::Io { .. } => 60,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InputNotFound { .. } | Error::InvalidDif { .. } => ErrorCategory::Input,
            Error::Topology(_) | Error::UnknownDif { .. } => ErrorCategory::Topology,
            Error::StreamOpen { .. } | Error::StreamRead { .. } => ErrorCategory::Stream,
            Error::UnsupportedVersion { .. } | Error::VersionMismatch { .. } => {
                ErrorCategory::Version
            }
            Error::Config(_) => ErrorCategory::Config,
            Error::Io { .. } => ErrorCategory::Io,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::InputNotFound { .. } => {
                "Check the path given with -f. It must be an existing Parquet spill table."
            }
            Error::InvalidDif { .. } => {
                "Pass a DIF index below the configured DIF count (n_difs in the config file)."
            }
            Error::Topology(_) => {
                "Pass a JSON DIF→chip map or the path of a readable Pyrame XML configuration."
            }
            Error::UnknownDif { .. } => {
                "The DIF is in range but the topology does not describe it. Check the topology source."
            }
            Error::StreamOpen { .. } => {
                "The file must carry bsd.version and bsd.dif metadata and the spill columns for its version."
            }
            Error::StreamRead { .. } => {
                "The spill table is truncated or has null cells. Regenerate it from the beam summary data."
            }
            Error::UnsupportedVersion { .. } => {
                "Only v01 and p06 beam summary data are supported. Convert the input or update the tool."
            }
            Error::VersionMismatch { .. } => {
                "Pass --bsd-version matching the input, or set expected_version in the config file."
            }
            Error::Config(_) => {
                "Fix the configuration file or remove it to fall back to built-in defaults."
            }
            Error::Io { .. } => {
                "Check disk space and permissions of the output directory, then rerun."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::InputNotFound { .. } => "Input File Not Found",
            Error::InvalidDif { .. } => "Invalid DIF",
            Error::Topology(_) => "Topology Error",
            Error::UnknownDif { .. } => "Unknown DIF",
            Error::StreamOpen { .. } => "Failed To Open Spill Table",
            Error::StreamRead { .. } => "Failed To Read Spill Table",
            Error::UnsupportedVersion { .. } => "Unsupported Format Version",
            Error::VersionMismatch { .. } => "Format Version Mismatch",
            Error::Config(_) => "Configuration Error",
            Error::Io { .. } => "I/O Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Additional structured context (e.g., dif, file path).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::InputNotFound { path } => {
                context.insert("path".to_string(), serde_json::json!(path));
            }
            Error::InvalidDif { dif, n_difs } => {
                context.insert("dif".to_string(), serde_json::json!(dif));
                context.insert("n_difs".to_string(), serde_json::json!(n_difs));
            }
            Error::UnknownDif { dif } => {
                context.insert("dif".to_string(), serde_json::json!(dif));
            }
            Error::StreamOpen { path, dif, .. } => {
                context.insert("path".to_string(), serde_json::json!(path));
                context.insert("dif".to_string(), serde_json::json!(dif));
            }
            Error::StreamRead { path, entry, .. } => {
                context.insert("path".to_string(), serde_json::json!(path));
                context.insert("entry".to_string(), serde_json::json!(entry));
            }
            Error::UnsupportedVersion { version } => {
                context.insert("version".to_string(), serde_json::json!(version));
            }
            Error::VersionMismatch { expected, actual } => {
                context.insert("expected".to_string(), serde_json::json!(expected));
                context.insert("actual".to_string(), serde_json::json!(actual));
            }
            Error::Io { path, .. } => {
                context.insert("path".to_string(), serde_json::json!(path));
            }
            Error::Topology(_) | Error::Config(_) => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}
