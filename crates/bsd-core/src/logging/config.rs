//! Log settings for one `bsd-core` invocation.
//!
//! The level comes from `BSD_LOG` (or the bare-level directive of `RUST_LOG`)
//! and is then overridden by `-q` / `-v`. The format comes from
//! `BSD_LOG_FORMAT`, overridden by `--log-format`.

use std::str::FromStr;

use clap::ValueEnum;
use tracing_subscriber::filter::LevelFilter;

/// Level environment variable.
pub const LOG_ENV_VAR: &str = "BSD_LOG";
/// Format environment variable.
pub const LOG_FORMAT_ENV_VAR: &str = "BSD_LOG_FORMAT";

/// How log records are written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// tracing-subscriber fmt lines
    #[default]
    Human,
    /// One JSON object per event
    Jsonl,
}

/// Resolved log settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LevelFilter,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LevelFilter::INFO,
        }
    }
}

impl LogConfig {
    /// Resolve from the process environment and the CLI verbosity flags.
    pub fn resolve(verbose: u8, quiet: bool, format: Option<LogFormat>) -> Self {
        Self::resolve_with(|key| std::env::var(key).ok(), verbose, quiet, format)
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with(
        env: impl Fn(&str) -> Option<String>,
        verbose: u8,
        quiet: bool,
        format: Option<LogFormat>,
    ) -> Self {
        let mut config = LogConfig::default();

        let env_level = match env(LOG_ENV_VAR) {
            Some(value) => LevelFilter::from_str(value.trim()).ok(),
            None => env("RUST_LOG").as_deref().and_then(bare_level),
        };
        if let Some(level) = env_level {
            config.level = level;
        }
        if let Some(value) = env(LOG_FORMAT_ENV_VAR) {
            if let Ok(format) = <LogFormat as ValueEnum>::from_str(value.trim(), true) {
                config.format = format;
            }
        }

        if quiet {
            config.level = LevelFilter::ERROR;
        } else if verbose == 1 {
            config.level = LevelFilter::DEBUG;
        } else if verbose > 1 {
            config.level = LevelFilter::TRACE;
        }
        if let Some(format) = format {
            config.format = format;
        }
        config
    }
}

/// The last target-less directive of a `RUST_LOG` value (`info`, `a=debug,warn`).
fn bare_level(directives: &str) -> Option<LevelFilter> {
    directives
        .rsplit(',')
        .map(str::trim)
        .find(|d| !d.is_empty() && !d.contains('='))
        .and_then(|d| LevelFilter::from_str(d).ok())
}
