//! Event vocabulary and the JSONL record.
//!
//! Every event a run emits uses a name from [`event_names`] as its tracing
//! target and a [`Stage`]; the [`LogContext`] supplies the correlation ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity as written in JSONL records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Processing stages of a beam summary run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Argument checks and configuration.
    Init,
    Topology,
    /// Spill table open and streaming.
    Stream,
    Classify,
    /// Report sink writes.
    Report,
    /// Sink commit and summary.
    Finalize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Topology => "topology",
            Stage::Stream => "stream",
            Stage::Classify => "classify",
            Stage::Report => "report",
            Stage::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event names, used as tracing targets.
pub mod event_names {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";
    pub const RUN_FAILED: &str = "run.failed";
    pub const RUN_TRANSITION: &str = "run.transition";
    pub const OVERWRITE_INERT: &str = "run.overwrite_inert";

    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";

    pub const TOPOLOGY_RESOLVED: &str = "topology.resolved";
    pub const TOPOLOGY_XML_FALLBACK: &str = "topology.xml_fallback";

    pub const STREAM_OPENED: &str = "stream.opened";
    pub const STREAM_PROGRESS: &str = "stream.progress";

    pub const SPILL_REJECTED: &str = "spill.rejected";

    pub const REPORT_COMMITTED: &str = "report.committed";
    pub const REPORT_DISCARDED: &str = "report.discarded";
}

/// One line of JSONL log output.
///
/// Correlation fields are optional because events emitted outside a run
/// (the Parquet reader's own debug lines, for instance) carry none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub ts: DateTime<Utc>,
    pub level: Level,
    /// Event name, from the tracing target.
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dif: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Remaining event fields.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl LogEvent {
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","event":"{}"}}"#,
                self.event
            )
        })
    }
}

/// Correlation ids attached to every event of one invocation.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    /// DIF the run is scoped to, once known.
    pub dif: Option<u32>,
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            dif: None,
            host_id: host_id.into(),
        }
    }

    pub fn with_dif(mut self, dif: u32) -> Self {
        self.dif = Some(dif);
        self
    }
}
