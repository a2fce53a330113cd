//! Beam Summary Data - spill classification and POT accounting
//!
//! Reads the beam summary spill table of one acquisition run, classifies
//! every spill, writes the per-spill report files and prints the run
//! summary on stdout. Logs go to stderr.

use std::io::IsTerminal;
use std::path::PathBuf;

use bsd_common::{format_error_human, Error, OutputFormat, StructuredError};
use bsd_core::config::{load_config, ConfigOptions};
use bsd_core::exit_codes::ExitCode;
use bsd_core::log_event;
use bsd_core::logging::{
    event_names, generate_run_id, get_host_id, init_logging, LogConfig, LogContext, LogFormat,
    Stage,
};
use bsd_core::output::render;
use bsd_core::{RunDriver, RunOptions};
use clap::Parser;

/// Beam Summary Data - classify beam spills and accumulate protons on target
#[derive(Parser, Debug)]
#[command(name = "bsd-core")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Spill table (Parquet) of one acquisition run
    #[arg(short = 'f', long = "input", value_name = "FILE")]
    input: PathBuf,

    /// Detector topology: a JSON string or the path of a Pyrame XML config
    #[arg(short = 'p', long = "topology", value_name = "SRC")]
    topology: String,

    /// Directory for the report files (default: the input's directory)
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    output: Option<PathBuf>,

    /// DIF index the run is scoped to
    #[arg(short = 'n', long = "dif", default_value_t = 0)]
    dif: u32,

    /// Overwrite existing report files (accepted; reports are always replaced)
    #[arg(short = 'r', long)]
    overwrite: bool,

    /// Expected beam summary format version (overrides the config file)
    #[arg(long = "bsd-version", value_name = "TAG")]
    bsd_version: Option<String>,

    /// T2K run number, used to name the report files
    #[arg(long)]
    t2krun: Option<u32>,

    /// Main ring run number, used to name the report files
    #[arg(long)]
    mrrun: Option<u32>,

    /// Config file (toml, json or yaml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format for the run summary
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Log format on stderr
    #[arg(long, value_enum, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            input: self.input.clone(),
            topology: self.topology.clone(),
            output_dir: self.output.clone(),
            dif: self.dif,
            overwrite: self.overwrite,
            version: self.bsd_version.clone(),
            t2krun: self.t2krun,
            mrrun: self.mrrun,
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version are not failures.
            let code = if err.use_stderr() {
                ExitCode::ArgsError
            } else {
                ExitCode::Success
            };
            let _ = err.print();
            std::process::exit(code.as_i32());
        }
    };

    let log_config = LogConfig::resolve(cli.verbose, cli.quiet, cli.log_format);
    init_logging(&log_config);

    let exit_code = run(&cli);
    std::process::exit(exit_code.as_i32());
}

fn run(cli: &Cli) -> ExitCode {
    let run_id = generate_run_id();
    let ctx = LogContext::new(run_id.clone(), get_host_id()).with_dif(cli.dif);

    let options = ConfigOptions {
        config_path: cli.config.clone(),
        config_dir: None,
    };
    let resolved = match load_config(&options) {
        Ok(resolved) => resolved,
        Err(err) => return report_error(cli.format, &ctx, &err.into()),
    };
    match &resolved.path {
        Some(path) => {
            let path = path.display().to_string();
            log_event!(
                ctx,
                DEBUG,
                event_names::CONFIG_LOADED,
                Stage::Init,
                "loaded config file",
                path = path.as_str()
            );
        }
        None => log_event!(
            ctx,
            DEBUG,
            event_names::CONFIG_DEFAULT_USED,
            Stage::Init,
            "no config file found; using defaults"
        ),
    }

    let mut driver = RunDriver::new(resolved.config, ctx.clone());
    match driver.run(&cli.run_options()) {
        Ok(outcome) => {
            println!("{}", render(cli.format, &run_id, &outcome));
            ExitCode::Success
        }
        Err(err) => report_error(cli.format, &ctx, &err),
    }
}

/// Print one diagnostic on stderr and pick the exit code.
fn report_error(format: OutputFormat, ctx: &LogContext, err: &Error) -> ExitCode {
    match format {
        OutputFormat::Json => {
            let mut structured = StructuredError::from(err);
            structured
                .context
                .insert("run_id".to_string(), serde_json::json!(ctx.run_id));
            eprintln!("{}", structured.to_json_pretty());
        }
        OutputFormat::Human | OutputFormat::Summary => {
            let use_color = std::io::stderr().is_terminal();
            eprintln!("{}", format_error_human(err, use_color));
        }
    }
    ExitCode::from(err)
}
