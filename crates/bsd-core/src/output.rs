//! Console rendering of a finished run.

use bsd_common::{OutputFormat, SCHEMA_VERSION};
use serde::Serialize;

use crate::driver::RunOutcome;

const RULE: &str = "=============================================";

/// JSON document printed with `--format json`.
#[derive(Debug, Serialize)]
pub struct SummaryDocument<'a> {
    pub schema_version: &'static str,
    pub run_id: &'a str,
    pub generated_at: String,
    #[serde(flatten)]
    pub outcome: &'a RunOutcome,
}

impl<'a> SummaryDocument<'a> {
    pub fn new(run_id: &'a str, outcome: &'a RunOutcome) -> Self {
        SummaryDocument {
            schema_version: SCHEMA_VERSION,
            run_id,
            generated_at: chrono::Utc::now().to_rfc3339(),
            outcome,
        }
    }
}

/// Render the outcome for stdout.
pub fn render(format: OutputFormat, run_id: &str, outcome: &RunOutcome) -> String {
    match format {
        OutputFormat::Human => render_human(outcome),
        OutputFormat::Json => serde_json::to_string_pretty(&SummaryDocument::new(run_id, outcome))
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{e}"}}"#)),
        OutputFormat::Summary => render_summary(outcome),
    }
}

/// The beam data summary block.
pub fn render_human(outcome: &RunOutcome) -> String {
    let s = &outcome.summary;
    let mut out = String::new();
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!(" Beam Data Summary: {}\n", outcome.label));
    out.push_str(&format!(
        " Total Spill: {}, Total POT: {:.5e}\n",
        s.accepted_spill_count, s.accepted_pot_total
    ));
    out.push_str(&format!(
        "  FHC Spill: {}, POT: {:.5e}\n",
        s.neutrino_spill_count, s.neutrino_pot_total
    ));
    out.push_str(&format!(
        "  RHC Spill: {}, POT: {:.5e}\n",
        s.antineutrino_spill_count, s.antineutrino_pot_total
    ));
    out.push_str(RULE);
    out
}

/// One line: accepted, FHC and RHC counts and POT.
pub fn render_summary(outcome: &RunOutcome) -> String {
    let s = &outcome.summary;
    format!(
        "{}: {} spills ({:.5e} POT), FHC {} ({:.5e}), RHC {} ({:.5e}), rejected {}",
        outcome.label,
        s.accepted_spill_count,
        s.accepted_pot_total,
        s.neutrino_spill_count,
        s.neutrino_pot_total,
        s.antineutrino_spill_count,
        s.antineutrino_pot_total,
        s.rejected_spill_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulate::RunSummary;
    use crate::driver::{RunInfo, RunState};
    use crate::report::{OutputPaths, ReportCounts, RunNaming};
    use bsd_common::FormatVersion;
    use std::path::Path;

    fn outcome() -> RunOutcome {
        RunOutcome {
            label: "T2KRUN10, MRRUN83".to_string(),
            dif: 0,
            version: FormatVersion::P06,
            summary: RunSummary {
                accepted_spill_count: 2,
                accepted_pot_total: 5e11,
                neutrino_spill_count: 1,
                neutrino_pot_total: 2e11,
                antineutrino_spill_count: 1,
                antineutrino_pot_total: 3e11,
                rejected_spill_count: 3,
                ..RunSummary::default()
            },
            info: RunInfo {
                entries: 5,
                start_time: Some(1),
                stop_time: Some(5),
                spill_count_span: Some(4),
                n_chips: 20,
            },
            outputs: OutputPaths::new(
                Path::new("/out"),
                &RunNaming::Runs {
                    t2krun: 10,
                    mrrun: 83,
                },
            ),
            lines_written: ReportCounts::default(),
            history: vec![RunState::Idle, RunState::Done],
        }
    }

    #[test]
    fn test_human_block() {
        let text = render_human(&outcome());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], RULE);
        assert_eq!(lines[1], " Beam Data Summary: T2KRUN10, MRRUN83");
        assert_eq!(lines[2], " Total Spill: 2, Total POT: 5.00000e11");
        assert_eq!(lines[3], "  FHC Spill: 1, POT: 2.00000e11");
        assert_eq!(lines[4], "  RHC Spill: 1, POT: 3.00000e11");
        assert_eq!(lines[5], RULE);
    }

    #[test]
    fn test_json_document() {
        let text = render(OutputFormat::Json, "run-abc", &outcome());
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["schema_version"], SCHEMA_VERSION);
        assert_eq!(value["run_id"], "run-abc");
        assert_eq!(value["version"], "p06");
        assert_eq!(value["summary"]["accepted_spill_count"], 2);
        assert_eq!(value["info"]["spill_count_span"], 4);
        assert_eq!(
            value["outputs"]["combined"],
            "/out/spill_bsd_t2krun10_mrrun083.txt"
        );
        assert!(value["generated_at"].is_string());
    }

    #[test]
    fn test_summary_line() {
        let line = render(OutputFormat::Summary, "run-abc", &outcome());
        assert!(line.starts_with("T2KRUN10, MRRUN83: 2 spills"));
        assert!(line.ends_with("rejected 3"));
    }
}
