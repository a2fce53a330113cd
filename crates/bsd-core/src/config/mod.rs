//! Configuration loading and validation for bsd-core.
//!
//! This module handles:
//! - Loading a `bsd.toml` / `bsd.json` / `bsd.yaml` file
//! - Config resolution order (CLI > env > XDG > defaults)
//! - Semantic validation (positive thresholds, DIF count)

pub mod validation;

pub use validation::{validate_config, ValidationError};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default XDG config directory name.
const CONFIG_DIR_NAME: &str = "wagasci_bsd";

/// Default config file name inside the config directory.
const CONFIG_FILE_NAME: &str = "bsd.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "BSD_CONFIG";

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Invalid {format} in config file {}: {message}", path.display())]
    ParseError {
        path: PathBuf,
        format: ConfigFormat,
        message: String,
    },

    #[error("Unsupported config file extension: {}", path.display())]
    UnknownFormat { path: PathBuf },

    #[error("Semantic validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("I/O error reading {}: {source}", path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for bsd_common::Error {
    fn from(err: ConfigError) -> Self {
        bsd_common::Error::Config(err.to_string())
    }
}

/// On-disk config file format, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "json" => Some(ConfigFormat::Json),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigFormat::Toml => write!(f, "TOML"),
            ConfigFormat::Json => write!(f, "JSON"),
            ConfigFormat::Yaml => write!(f, "YAML"),
        }
    }
}

/// Spill selection thresholds for the p06 rule set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpillCuts {
    /// Minimum protons on target (`ct_np[4][0]`) for a usable spill.
    pub min_protons: f64,
    /// Maximum muon-monitor profile center distance from the beam axis.
    pub max_mumon_center: f64,
    /// Nominal horn current magnitude (kA).
    pub horn_current: f64,
    /// Allowed deviation from the nominal horn current, inclusive.
    pub horn_tolerance: f64,
}

impl Default for SpillCuts {
    fn default() -> Self {
        SpillCuts {
            min_protons: 1e11,
            max_mumon_center: 10.0,
            horn_current: 250.0,
            horn_tolerance: 5.0,
        }
    }
}

/// Run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BsdConfig {
    /// Number of DIFs in the detector; valid DIF indices are `0..n_difs`.
    pub n_difs: u32,
    /// Format version the input table must declare.
    pub expected_version: String,
    pub cuts: SpillCuts,
    /// Records between progress log lines.
    pub progress_interval: usize,
}

impl Default for BsdConfig {
    fn default() -> Self {
        BsdConfig {
            n_difs: 8,
            expected_version: bsd_common::FormatVersion::P06.to_string(),
            cuts: SpillCuts::default(),
            progress_interval: 1000,
        }
    }
}

/// Resolved configuration with provenance information.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: BsdConfig,
    /// File the config was read from (None if using defaults).
    pub path: Option<PathBuf>,
}

/// Configuration resolution options.
#[derive(Debug, Default)]
pub struct ConfigOptions {
    /// Explicit config file (highest priority).
    pub config_path: Option<PathBuf>,
    /// Directory searched for `bsd.toml` instead of the XDG config home.
    pub config_dir: Option<PathBuf>,
}

/// Load configuration with the standard resolution order.
///
/// Resolution order (highest to lowest priority):
/// 1. Explicit `--config` path (via ConfigOptions)
/// 2. Environment variable (BSD_CONFIG)
/// 3. XDG config home (~/.config/wagasci_bsd/bsd.toml)
/// 4. Built-in defaults
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    if let Some(path) = &options.config_path {
        return load_required(path);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return load_required(Path::new(&path));
        }
    }

    let default_path = resolve_config_dir(options).join(CONFIG_FILE_NAME);
    if default_path.exists() {
        return load_required(&default_path);
    }

    let config = BsdConfig::default();
    validate_config(&config)?;
    Ok(ResolvedConfig { config, path: None })
}

/// Resolve the directory searched for the default config file.
fn resolve_config_dir(options: &ConfigOptions) -> PathBuf {
    if let Some(dir) = &options.config_dir {
        return dir.clone();
    }

    let xdg_config = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });

    xdg_config.join(CONFIG_DIR_NAME)
}

fn load_required(path: &Path) -> Result<ResolvedConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let config = load_config_from_file(path)?;
    validate_config(&config)?;
    Ok(ResolvedConfig {
        config,
        path: Some(path.to_path_buf()),
    })
}

/// Parse a config file, choosing the format by extension.
pub fn load_config_from_file(path: &Path) -> Result<BsdConfig, ConfigError> {
    let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnknownFormat {
        path: path.to_path_buf(),
    })?;

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_config(&content, format).map_err(|message| ConfigError::ParseError {
        path: path.to_path_buf(),
        format,
        message,
    })
}

fn parse_config(content: &str, format: ConfigFormat) -> Result<BsdConfig, String> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
    }
}
