//! Per-spill report files.
//!
//! Every accepted spill appends one line to the combined sink and one to the
//! sink of its polarity:
//!
//! ```text
//! <spill_number> <polarity_flag> <trigger_seconds> <running_pot_total>
//! ```
//!
//! The combined file carries the running total of all accepted spills in
//! scientific notation (`5.00000e11`); the per-polarity files carry their own
//! running total in plain decimal.
//!
//! Files created by [`ReportWriter::create`] are written under a `.tmp` name
//! and only renamed into place by [`ReportWriter::finish`]. A failed run calls
//! [`ReportWriter::abort`], which leaves earlier reports untouched.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bsd_common::{Error, Result, SpillRecord};
use serde::Serialize;

use crate::accumulate::RunSummary;
use crate::classify::Polarity;

/// How report files are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunNaming {
    /// `spill_bsd_t2krun{T}_mrrun{MMM}[_fhc|_rhc].txt`
    Runs { t2krun: u32, mrrun: u32 },
    /// `{stem}_bsd[_fhc|_rhc].txt`
    Stem(String),
}

impl RunNaming {
    /// Use run numbers when both are known, else the input file stem.
    pub fn from_options(t2krun: Option<u32>, mrrun: Option<u32>, input: &Path) -> Self {
        match (t2krun, mrrun) {
            (Some(t2krun), Some(mrrun)) => RunNaming::Runs { t2krun, mrrun },
            _ => RunNaming::Stem(
                input
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "spill".to_string()),
            ),
        }
    }

    fn base(&self) -> String {
        match self {
            RunNaming::Runs { t2krun, mrrun } => {
                format!("spill_bsd_t2krun{}_mrrun{:03}", t2krun, mrrun)
            }
            RunNaming::Stem(stem) => format!("{}_bsd", stem),
        }
    }

    /// Label used in the console summary header.
    pub fn label(&self) -> String {
        match self {
            RunNaming::Runs { t2krun, mrrun } => format!("T2KRUN{}, MRRUN{}", t2krun, mrrun),
            RunNaming::Stem(stem) => stem.clone(),
        }
    }
}

/// Paths of the three report files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPaths {
    pub combined: PathBuf,
    pub neutrino: PathBuf,
    pub antineutrino: PathBuf,
}

impl OutputPaths {
    pub fn new(dir: &Path, naming: &RunNaming) -> Self {
        let base = naming.base();
        OutputPaths {
            combined: dir.join(format!("{}.txt", base)),
            neutrino: dir.join(format!("{}_fhc.txt", base)),
            antineutrino: dir.join(format!("{}_rhc.txt", base)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        [&self.combined, &self.neutrino, &self.antineutrino]
            .into_iter()
            .map(PathBuf::as_path)
    }
}

struct Sink<W> {
    writer: W,
    /// Final location; labels errors.
    path: PathBuf,
    /// Where the bytes go until `commit`.
    staging: Option<PathBuf>,
    lines: u64,
}

impl<W: Write> Sink<W> {
    fn new(writer: W, path: PathBuf) -> Self {
        Sink {
            writer,
            path,
            staging: None,
            lines: 0,
        }
    }

    fn line(&mut self, args: std::fmt::Arguments<'_>) -> Result<()> {
        self.writer
            .write_fmt(args)
            .and_then(|()| self.writer.write_all(b"\n"))
            .map_err(|e| Error::io(&self.path, e))?;
        self.lines += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| Error::io(&self.path, e))
    }

    fn commit(&self) -> Result<()> {
        match &self.staging {
            Some(staging) => fs::rename(staging, &self.path).map_err(|e| Error::io(&self.path, e)),
            None => Ok(()),
        }
    }
}

impl Sink<BufWriter<File>> {
    fn staged(path: &Path) -> Result<Self> {
        let staging = staging_path(path);
        let file = File::create(&staging).map_err(|e| Error::io(&staging, e))?;
        Ok(Sink {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            staging: Some(staging),
            lines: 0,
        })
    }
}

/// `run_bsd.txt` -> `run_bsd.txt.tmp`
fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn discard<W>(sinks: impl IntoIterator<Item = Sink<W>>) {
    for sink in sinks {
        let Sink { writer, staging, .. } = sink;
        drop(writer);
        if let Some(staging) = staging {
            let _ = fs::remove_file(staging);
        }
    }
}

/// Line counts written per sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
    pub combined: u64,
    pub neutrino: u64,
    pub antineutrino: u64,
}

/// Append-only writer over the combined, neutrino and antineutrino sinks.
pub struct ReportWriter<W: Write> {
    combined: Sink<W>,
    neutrino: Sink<W>,
    antineutrino: Sink<W>,
}

impl ReportWriter<BufWriter<File>> {
    /// Open staged files for the three reports. Existing reports are kept
    /// until `finish`.
    pub fn create(paths: &OutputPaths) -> Result<Self> {
        let combined = Sink::staged(&paths.combined)?;
        let neutrino = match Sink::staged(&paths.neutrino) {
            Ok(sink) => sink,
            Err(err) => {
                discard([combined]);
                return Err(err);
            }
        };
        let antineutrino = match Sink::staged(&paths.antineutrino) {
            Ok(sink) => sink,
            Err(err) => {
                discard([combined, neutrino]);
                return Err(err);
            }
        };
        Ok(ReportWriter {
            combined,
            neutrino,
            antineutrino,
        })
    }
}

impl<W: Write> ReportWriter<W> {
    /// Wrap arbitrary writers; `paths` only label errors.
    pub fn new(combined: W, neutrino: W, antineutrino: W, paths: &OutputPaths) -> Self {
        ReportWriter {
            combined: Sink::new(combined, paths.combined.clone()),
            neutrino: Sink::new(neutrino, paths.neutrino.clone()),
            antineutrino: Sink::new(antineutrino, paths.antineutrino.clone()),
        }
    }

    /// Append the lines for one accepted spill. `summary` must already include it.
    pub fn write_spill(
        &mut self,
        record: &SpillRecord,
        polarity: Polarity,
        summary: &RunSummary,
    ) -> Result<()> {
        let flag = polarity.flag();
        let (sink, polarity_total) = match polarity {
            Polarity::Neutrino => (&mut self.neutrino, summary.neutrino_pot_total),
            Polarity::Antineutrino => (&mut self.antineutrino, summary.antineutrino_pot_total),
        };
        sink.line(format_args!(
            "{} {} {} {}",
            record.spill_number, flag, record.trigger_seconds, polarity_total
        ))?;
        self.combined.line(format_args!(
            "{} {} {} {:.5e}",
            record.spill_number, flag, record.trigger_seconds, summary.accepted_pot_total
        ))
    }

    pub fn counts(&self) -> ReportCounts {
        ReportCounts {
            combined: self.combined.lines,
            neutrino: self.neutrino.lines,
            antineutrino: self.antineutrino.lines,
        }
    }

    /// Flush all sinks, move staged files into place and hand back the writers.
    pub fn finish(mut self) -> Result<(W, W, W)> {
        let flushed = self
            .combined
            .flush()
            .and_then(|()| self.neutrino.flush())
            .and_then(|()| self.antineutrino.flush())
            .and_then(|()| self.combined.commit())
            .and_then(|()| self.neutrino.commit())
            .and_then(|()| self.antineutrino.commit());
        if let Err(err) = flushed {
            self.abort();
            return Err(err);
        }
        Ok((
            self.combined.writer,
            self.neutrino.writer,
            self.antineutrino.writer,
        ))
    }

    /// Drop the writers and delete any staged files.
    pub fn abort(self) {
        discard([self.combined, self.neutrino, self.antineutrino]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulate::PotAccumulator;
    use crate::classify::Verdict;
    use bsd_common::spill::{CT_NP_COLS, CT_NP_ROWS};
    use bsd_common::SpillBeam;

    fn record(spill_number: i32, trg: i64) -> SpillRecord {
        SpillRecord {
            spill_number,
            spill_count: spill_number,
            trigger_seconds: trg,
            beam: SpillBeam::V01 {
                good_spill_flag: 1,
                ct_np: [[0.0; CT_NP_COLS]; CT_NP_ROWS],
            },
        }
    }

    fn memory_writer() -> ReportWriter<Vec<u8>> {
        let paths = OutputPaths::new(Path::new("mem"), &RunNaming::Stem("t".into()));
        ReportWriter::new(Vec::new(), Vec::new(), Vec::new(), &paths)
    }

    #[test]
    fn test_line_formats() {
        let mut writer = memory_writer();
        let mut acc = PotAccumulator::new();

        let s = acc.apply(Verdict::AcceptedNeutrinoMode, 2e11).clone();
        writer.write_spill(&record(101, 1000), Polarity::Neutrino, &s).unwrap();
        let s = acc.apply(Verdict::AcceptedAntineutrinoMode, 3e11).clone();
        writer
            .write_spill(&record(104, 1003), Polarity::Antineutrino, &s)
            .unwrap();

        assert_eq!(
            writer.counts(),
            ReportCounts {
                combined: 2,
                neutrino: 1,
                antineutrino: 1
            }
        );
        let (combined, fhc, rhc) = writer.finish().unwrap();
        assert_eq!(
            String::from_utf8(combined).unwrap(),
            "101 0 1000 2.00000e11\n104 1 1003 5.00000e11\n"
        );
        assert_eq!(String::from_utf8(fhc).unwrap(), "101 0 1000 200000000000\n");
        assert_eq!(String::from_utf8(rhc).unwrap(), "104 1 1003 300000000000\n");
    }

    #[test]
    fn test_run_naming() {
        let naming = RunNaming::from_options(Some(10), Some(83), Path::new("/data/x.parquet"));
        let paths = OutputPaths::new(Path::new("/out"), &naming);
        assert_eq!(
            paths.combined,
            PathBuf::from("/out/spill_bsd_t2krun10_mrrun083.txt")
        );
        assert_eq!(
            paths.neutrino,
            PathBuf::from("/out/spill_bsd_t2krun10_mrrun083_fhc.txt")
        );
        assert_eq!(
            paths.antineutrino,
            PathBuf::from("/out/spill_bsd_t2krun10_mrrun083_rhc.txt")
        );
        assert_eq!(naming.label(), "T2KRUN10, MRRUN83");
    }

    #[test]
    fn test_stem_naming() {
        let naming = RunNaming::from_options(Some(10), None, Path::new("/data/run083_dif0.parquet"));
        assert_eq!(naming, RunNaming::Stem("run083_dif0".to_string()));
        let paths = OutputPaths::new(Path::new("/out"), &naming);
        assert_eq!(paths.combined, PathBuf::from("/out/run083_dif0_bsd.txt"));
        assert_eq!(paths.iter().count(), 3);
    }

    #[test]
    fn test_create_and_flush_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = OutputPaths::new(dir.path(), &RunNaming::Stem("run".into()));
        let mut writer = ReportWriter::create(&paths).unwrap();
        let mut acc = PotAccumulator::new();
        let s = acc.apply(Verdict::AcceptedNeutrinoMode, 1.5e13).clone();
        writer.write_spill(&record(7, 42), Polarity::Neutrino, &s).unwrap();
        writer.finish().unwrap();

        assert_eq!(
            std::fs::read_to_string(&paths.combined).unwrap(),
            "7 0 42 1.50000e13\n"
        );
        assert_eq!(
            std::fs::read_to_string(&paths.neutrino).unwrap(),
            "7 0 42 15000000000000\n"
        );
        assert_eq!(std::fs::read_to_string(&paths.antineutrino).unwrap(), "");
    }

    #[test]
    fn test_reports_appear_on_finish() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = OutputPaths::new(dir.path(), &RunNaming::Stem("run".into()));
        let mut writer = ReportWriter::create(&paths).unwrap();
        let mut acc = PotAccumulator::new();
        let s = acc.apply(Verdict::AcceptedNeutrinoMode, 2e11).clone();
        writer.write_spill(&record(1, 10), Polarity::Neutrino, &s).unwrap();

        assert!(paths.iter().all(|p| !p.exists()));
        assert!(staging_path(&paths.combined).exists());

        writer.finish().unwrap();
        assert!(paths.iter().all(Path::exists));
        assert!(paths.iter().all(|p| !staging_path(p).exists()));
    }

    #[test]
    fn test_abort_keeps_previous_reports() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = OutputPaths::new(dir.path(), &RunNaming::Stem("run".into()));
        std::fs::write(&paths.combined, "1 0 10 2.00000e11\n").unwrap();

        let mut writer = ReportWriter::create(&paths).unwrap();
        let mut acc = PotAccumulator::new();
        let s = acc.apply(Verdict::AcceptedAntineutrinoMode, 3e11).clone();
        writer
            .write_spill(&record(2, 11), Polarity::Antineutrino, &s)
            .unwrap();
        writer.abort();

        assert_eq!(
            std::fs::read_to_string(&paths.combined).unwrap(),
            "1 0 10 2.00000e11\n"
        );
        assert!(!paths.neutrino.exists());
        assert!(!paths.antineutrino.exists());
        assert!(paths.iter().all(|p| !staging_path(p).exists()));
    }

    #[test]
    fn test_staging_path() {
        assert_eq!(
            staging_path(Path::new("/out/run_bsd_fhc.txt")),
            PathBuf::from("/out/run_bsd_fhc.txt.tmp")
        );
    }

    #[test]
    fn test_create_in_missing_dir_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = OutputPaths::new(&dir.path().join("absent"), &RunNaming::Stem("r".into()));
        let err = ReportWriter::create(&paths).err().unwrap();
        assert_eq!(err.code(), 60);
    }
}
