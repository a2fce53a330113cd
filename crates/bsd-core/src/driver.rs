//! Run driver: one beam summary pass over one spill table.
//!
//! ```text
//! Idle -> ResolvingTopology -> StreamingRecords -> Finalizing -> Done
//!   \             \                  \                 \
//!    +-------------+------------------+-----------------+--> Failed
//! ```
//!
//! The input file and DIF index are checked while idle. The format version
//! is checked right after the table is opened and before any report file is
//! created. Reports are staged until the stream completes, so a run that
//! fails partway leaves the previous reports as they were.

use std::path::PathBuf;

use bsd_common::{Error, FormatVersion, Result};
use bsd_tree::{columns, SpillTable};
use serde::{Deserialize, Serialize};

use crate::accumulate::{PotAccumulator, RunSummary};
use crate::classify::{SpillClassifier, Verdict};
use crate::config::{validate_config, BsdConfig, ConfigError};
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::report::{OutputPaths, ReportCounts, ReportWriter, RunNaming};
use crate::topology::{Topology, TopologySource};

/// Driver lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    ResolvingTopology,
    StreamingRecords,
    Finalizing,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::ResolvingTopology => "resolving_topology",
            RunState::StreamingRecords => "streaming_records",
            RunState::Finalizing => "finalizing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }

    /// Logging stage for work done in this state.
    pub fn stage(&self) -> Stage {
        match self {
            RunState::Idle => Stage::Init,
            RunState::ResolvingTopology => Stage::Topology,
            RunState::StreamingRecords => Stage::Stream,
            RunState::Finalizing | RunState::Done | RunState::Failed => Stage::Finalize,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, ResolvingTopology)
                | (ResolvingTopology, StreamingRecords)
                | (StreamingRecords, Finalizing)
                | (Finalizing, Done)
                | (Idle | ResolvingTopology | StreamingRecords | Finalizing, Failed)
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-invocation inputs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Spill table to read.
    pub input: PathBuf,
    /// JSON topology or Pyrame XML path.
    pub topology: String,
    /// Report directory; defaults to the input's directory.
    pub output_dir: Option<PathBuf>,
    pub dif: u32,
    /// Accepted and logged; existing reports are always replaced.
    pub overwrite: bool,
    /// Overrides the configured expected version.
    pub version: Option<String>,
    pub t2krun: Option<u32>,
    pub mrrun: Option<u32>,
}

impl RunOptions {
    pub fn new(input: impl Into<PathBuf>, topology: impl Into<String>) -> Self {
        RunOptions {
            input: input.into(),
            topology: topology.into(),
            output_dir: None,
            dif: 0,
            overwrite: false,
            version: None,
            t2krun: None,
            mrrun: None,
        }
    }

    pub fn with_dif(mut self, dif: u32) -> Self {
        self.dif = dif;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_runs(mut self, t2krun: u32, mrrun: u32) -> Self {
        self.t2krun = Some(t2krun);
        self.mrrun = Some(mrrun);
        self
    }

    fn resolved_output_dir(&self) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => match self.input.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        }
    }
}

/// Acquisition facts read from the spill table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub entries: usize,
    pub start_time: Option<i64>,
    pub stop_time: Option<i64>,
    /// `|max - min|` of the `spill_count` column.
    pub spill_count_span: Option<u64>,
    pub n_chips: usize,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub label: String,
    pub dif: u32,
    pub version: FormatVersion,
    pub summary: RunSummary,
    pub info: RunInfo,
    pub outputs: OutputPaths,
    pub lines_written: ReportCounts,
    pub history: Vec<RunState>,
}

/// Sequences topology, stream, classification, accumulation and reports.
pub struct RunDriver {
    config: BsdConfig,
    classifier: SpillClassifier,
    ctx: LogContext,
    state: RunState,
    history: Vec<RunState>,
}

impl RunDriver {
    pub fn new(config: BsdConfig, ctx: LogContext) -> Self {
        let classifier = SpillClassifier::new(config.cuts);
        RunDriver {
            config,
            classifier,
            ctx,
            state: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// Run once. A driver that reached a terminal state cannot be rerun.
    pub fn run(&mut self, options: &RunOptions) -> Result<RunOutcome> {
        if self.state != RunState::Idle {
            return Err(Error::Config(format!(
                "run driver already used (state {})",
                self.state
            )));
        }
        self.ctx.dif = Some(options.dif);

        let input = options.input.display().to_string();
        log_event!(
            self.ctx,
            INFO,
            event_names::RUN_STARTED,
            Stage::Init,
            "starting beam summary run",
            input = input.as_str(),
            topology = options.topology.as_str()
        );

        match self.execute(options) {
            Ok(mut outcome) => {
                self.transition(RunState::Done);
                outcome.history = self.history.clone();
                log_event!(
                    self.ctx,
                    INFO,
                    event_names::RUN_FINISHED,
                    Stage::Finalize,
                    "beam summary run finished",
                    accepted = outcome.summary.accepted_spill_count,
                    accepted_pot = outcome.summary.accepted_pot_total,
                    rejected = outcome.summary.rejected_spill_count
                );
                Ok(outcome)
            }
            Err(err) => {
                let stage = self.state.stage();
                self.transition(RunState::Failed);
                let message = err.to_string();
                log_event!(
                    self.ctx,
                    ERROR,
                    event_names::RUN_FAILED,
                    stage,
                    "beam summary run failed",
                    code = err.code(),
                    error = message.as_str()
                );
                Err(err)
            }
        }
    }

    fn transition(&mut self, next: RunState) {
        let from = self.state;
        debug_assert!(
            from.can_transition_to(next),
            "invalid transition {from} -> {next}"
        );
        self.state = next;
        self.history.push(next);
        log_event!(
            self.ctx,
            DEBUG,
            event_names::RUN_TRANSITION,
            next.stage(),
            "state transition",
            from = from.as_str(),
            to = next.as_str()
        );
    }

    fn execute(&mut self, options: &RunOptions) -> Result<RunOutcome> {
        // Idle: config and argument checks.
        validate_config(&self.config).map_err(ConfigError::from)?;
        if !options.input.is_file() {
            return Err(Error::InputNotFound {
                path: options.input.clone(),
            });
        }
        if options.dif >= self.config.n_difs {
            return Err(Error::InvalidDif {
                dif: options.dif,
                n_difs: self.config.n_difs,
            });
        }
        if options.overwrite {
            log_event!(
                self.ctx,
                DEBUG,
                event_names::OVERWRITE_INERT,
                Stage::Init,
                "overwrite requested; report files are always replaced"
            );
        }

        self.transition(RunState::ResolvingTopology);
        let topology = Topology::resolve(&options.topology)?;
        let n_chips = topology.chip_count(options.dif)?;
        self.log_topology(&topology, n_chips);

        self.transition(RunState::StreamingRecords);
        let table = SpillTable::open(&options.input, options.dif)?;
        let version = self.check_version(&table, options)?;
        table.require_columns(version)?;
        log_event!(
            self.ctx,
            INFO,
            event_names::STREAM_OPENED,
            Stage::Stream,
            "opened spill table",
            entries = table.entries(),
            version = version.as_str()
        );

        let info = run_info(&table, n_chips)?;

        let output_dir = options.resolved_output_dir();
        std::fs::create_dir_all(&output_dir).map_err(|e| Error::io(&output_dir, e))?;
        let naming = RunNaming::from_options(options.t2krun, options.mrrun, &options.input);
        let outputs = OutputPaths::new(&output_dir, &naming);
        let mut writer = ReportWriter::create(&outputs)?;

        let summary = match self.stream(&table, version, &mut writer) {
            Ok(summary) => summary,
            Err(err) => {
                writer.abort();
                log_event!(
                    self.ctx,
                    DEBUG,
                    event_names::REPORT_DISCARDED,
                    Stage::Report,
                    "staged report files removed"
                );
                return Err(err);
            }
        };

        self.transition(RunState::Finalizing);
        let lines_written = writer.counts();
        writer.finish()?;
        log_event!(
            self.ctx,
            DEBUG,
            event_names::REPORT_COMMITTED,
            Stage::Report,
            "report files moved into place",
            combined = lines_written.combined,
            fhc = lines_written.neutrino,
            rhc = lines_written.antineutrino
        );

        Ok(RunOutcome {
            label: naming.label(),
            dif: options.dif,
            version,
            summary,
            info,
            outputs,
            lines_written,
            history: Vec::new(),
        })
    }

    /// Declared tag must equal the expected tag, and name a known format.
    fn check_version(&self, table: &SpillTable, options: &RunOptions) -> Result<FormatVersion> {
        let expected = options
            .version
            .as_deref()
            .unwrap_or(&self.config.expected_version)
            .trim();
        let declared = table.declared_version().trim();
        if declared != expected {
            return Err(Error::VersionMismatch {
                expected: expected.to_string(),
                actual: declared.to_string(),
            });
        }
        declared.parse()
    }

    fn stream<W: std::io::Write>(
        &self,
        table: &SpillTable,
        version: FormatVersion,
        writer: &mut ReportWriter<W>,
    ) -> Result<RunSummary> {
        let mut accumulator = PotAccumulator::new();
        let entries = table.entries();

        for (entry, record) in table.records(version).enumerate() {
            if entry % self.config.progress_interval == 0 {
                log_event!(
                    self.ctx,
                    INFO,
                    event_names::STREAM_PROGRESS,
                    Stage::Stream,
                    "streaming spills",
                    entry = entry,
                    entries = entries
                );
            }

            let record = record?;
            let verdict = self.classifier.classify(&record);
            let summary = accumulator.apply(verdict, record.proton_count());

            match verdict {
                Verdict::Rejected(reason) => {
                    log_event!(
                        self.ctx,
                        DEBUG,
                        event_names::SPILL_REJECTED,
                        Stage::Classify,
                        "spill rejected",
                        spill_number = record.spill_number,
                        reason = reason.as_str()
                    );
                }
                accepted => {
                    if let Some(polarity) = accepted.polarity() {
                        writer.write_spill(&record, polarity, summary)?;
                    }
                }
            }
            debug_assert!(summary.invariant_holds());
        }

        Ok(accumulator.into_summary())
    }

    fn log_topology(&self, topology: &Topology, n_chips: usize) {
        if let TopologySource::PyrameXml(path) = topology.source() {
            let path = path.display().to_string();
            log_event!(
                self.ctx,
                DEBUG,
                event_names::TOPOLOGY_XML_FALLBACK,
                Stage::Topology,
                "topology source is not JSON; read Pyrame XML",
                path = path.as_str()
            );
        }
        log_event!(
            self.ctx,
            INFO,
            event_names::TOPOLOGY_RESOLVED,
            Stage::Topology,
            "topology resolved",
            n_difs = topology.n_difs(),
            total_chips = topology.total_chips(),
            n_chips = n_chips
        );
    }
}

/// Entry count, acquisition window and spill-count span of a table.
pub fn run_info(table: &SpillTable, n_chips: usize) -> Result<RunInfo> {
    let max = table.maximum(columns::SPILL_COUNT)?;
    let min = table.minimum(columns::SPILL_COUNT)?;
    let spill_count_span = match (max, min) {
        (Some(max), Some(min)) => Some(max.abs_diff(min)),
        _ => None,
    };
    Ok(RunInfo {
        entries: table.entries(),
        start_time: table.start_time()?,
        stop_time: table.stop_time()?,
        spill_count_span,
        n_chips,
    })
}
