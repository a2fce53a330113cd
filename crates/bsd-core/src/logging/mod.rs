//! Logging for bsd-core: human `fmt` lines or JSONL records on stderr.
//!
//! ```ignore
//! use bsd_core::logging::{init_logging, LogConfig, LogContext, Stage, event_names};
//!
//! let config = LogConfig::resolve(cli.verbose, cli.quiet, cli.log_format);
//! init_logging(&config);
//!
//! let ctx = LogContext::new(generate_run_id(), get_host_id()).with_dif(3);
//! bsd_core::log_event!(ctx, INFO, event_names::RUN_STARTED, Stage::Init, "starting run");
//! ```
//!
//! stdout is reserved for the run summary; all log output goes to stderr.

pub mod config;
pub mod events;
pub mod layer;

pub use config::{LogConfig, LogFormat};
pub use events::{event_names, Level, LogContext, LogEvent, Stage};
pub use layer::JsonlLayer;

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging subsystem.
///
/// Must be called once at startup before any logging occurs.
/// Later calls are ignored.
pub fn init_logging(config: &LogConfig) {
    // Targets are event names, so the filter is a bare level.
    let filter = EnvFilter::new(config.level.to_string());

    let result = match config.format {
        LogFormat::Human => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_ansi(std::io::stderr().is_terminal()),
            )
            .try_init(),
        LogFormat::Jsonl => tracing_subscriber::registry()
            .with(filter)
            .with(JsonlLayer::stderr())
            .try_init(),
    };

    if let Err(err) = result {
        tracing::debug!(error = %err, "logging already initialized");
    }
}

/// Generate a unique run ID for this invocation.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    format!("run-{}", &uuid.simple().to_string()[..12])
}

/// Short host identifier: the machine-id prefix, else a hash of `HOSTNAME`.
pub fn get_host_id() -> String {
    let machine_id = std::fs::read_to_string("/etc/machine-id")
        .ok()
        .map(|id| id.trim().to_string())
        .filter(|id| id.len() >= 8 && id.is_ascii());
    let short = match (machine_id, std::env::var("HOSTNAME")) {
        (Some(id), _) => id[..8].to_string(),
        (None, Ok(hostname)) => {
            use std::hash::{DefaultHasher, Hash, Hasher};
            let mut hasher = DefaultHasher::new();
            hostname.hash(&mut hasher);
            format!("{:08x}", hasher.finish() as u32)
        }
        (None, Err(_)) => uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
    };
    format!("host-{short}")
}

/// Emit an event named `$event` with the context's correlation ids.
///
/// ```ignore
/// log_event!(ctx, DEBUG, event_names::SPILL_REJECTED, Stage::Classify, "spill rejected",
///     spill_number = 42, reason = "low_intensity");
/// ```
#[macro_export]
macro_rules! log_event {
    ($ctx:expr, $level:ident, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        ::tracing::event!(
            target: $event,
            ::tracing::Level::$level,
            run_id = %$ctx.run_id,
            dif = $ctx.dif,
            host_id = %$ctx.host_id,
            stage = %$stage,
            message = $msg,
            $($key = $val,)*
        )
    };
}
