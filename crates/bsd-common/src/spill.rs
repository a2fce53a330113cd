//! Spill record types.
//!
//! A spill is one beam-extraction cycle. The beam summary data (BSD) layout
//! differs between format versions, so the per-spill beam payload is an enum
//! with one variant per version: adding a version forces every consumer that
//! matches on it to handle the new layout.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Rows of the current-transformer proton-count table.
pub const CT_NP_ROWS: usize = 5;
/// Bunch columns of the current-transformer proton-count table.
pub const CT_NP_COLS: usize = 9;
/// Horns in the horn-current table.
pub const HCT_ROWS: usize = 3;
/// Readout columns per horn in the horn-current table.
pub const HCT_COLS: usize = 5;
/// Muon-monitor readout channels.
pub const MUMON_CHANNELS: usize = 12;

/// Current-transformer proton-count table, `ct_np[ct][bunch]`.
pub type ProtonTable = [[f64; CT_NP_COLS]; CT_NP_ROWS];
/// Horn-current table, `hct[horn][readout]`.
pub type HornTable = [[f64; HCT_COLS]; HCT_ROWS];

/// Beam summary data format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatVersion {
    /// Early format with a precomputed good-spill flag.
    V01,
    /// Format carrying raw spill/run flags, horn currents and muon monitor data.
    P06,
}

impl FormatVersion {
    /// All versions with a registered rule set.
    pub const ALL: [FormatVersion; 2] = [FormatVersion::V01, FormatVersion::P06];

    /// The tag written in spill table metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatVersion::V01 => "v01",
            FormatVersion::P06 => "p06",
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "v01" => Ok(FormatVersion::V01),
            "p06" => Ok(FormatVersion::P06),
            other => Err(Error::UnsupportedVersion {
                version: other.to_string(),
            }),
        }
    }
}

/// Version-specific beam payload of a spill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version", rename_all = "lowercase")]
pub enum SpillBeam {
    V01 {
        /// 1 for a good neutrino-mode spill, -1 for a good antineutrino-mode spill.
        good_spill_flag: i32,
        ct_np: ProtonTable,
    },
    P06 {
        spill_flag: i32,
        run_type: i32,
        ct_np: ProtonTable,
        hct: HornTable,
        mumon: [f64; MUMON_CHANNELS],
    },
}

/// One row of the spill instrumentation stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpillRecord {
    /// Beam-side spill number.
    pub spill_number: i32,
    /// Detector-side spill counter of the acquisition.
    pub spill_count: i32,
    /// Trigger time, seconds part. Passed through to the reports verbatim.
    pub trigger_seconds: i64,
    pub beam: SpillBeam,
}

impl SpillRecord {
    /// The format version of the beam payload.
    pub fn version(&self) -> FormatVersion {
        match self.beam {
            SpillBeam::V01 { .. } => FormatVersion::V01,
            SpillBeam::P06 { .. } => FormatVersion::P06,
        }
    }

    /// Protons on target delivered by this spill (`ct_np[4][0]`).
    pub fn proton_count(&self) -> f64 {
        match &self.beam {
            SpillBeam::V01 { ct_np, .. } | SpillBeam::P06 { ct_np, .. } => ct_np[4][0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        assert_eq!("v01".parse::<FormatVersion>().unwrap(), FormatVersion::V01);
        assert_eq!(" p06 ".parse::<FormatVersion>().unwrap(), FormatVersion::P06);
    }

    #[test]
    fn test_unknown_version_is_unsupported() {
        let err = "p07".parse::<FormatVersion>().unwrap_err();
        match err {
            Error::UnsupportedVersion { version } => assert_eq!(version, "p07"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_version_tags_round_trip() {
        for version in FormatVersion::ALL {
            assert_eq!(version.as_str().parse::<FormatVersion>().unwrap(), version);
        }
    }

    #[test]
    fn test_proton_count_reads_ct4_first_bunch() {
        let mut ct_np = [[0.0; CT_NP_COLS]; CT_NP_ROWS];
        ct_np[4][0] = 2.5e13;
        ct_np[4][1] = 1.0;
        let record = SpillRecord {
            spill_number: 10,
            spill_count: 3,
            trigger_seconds: 1_577_836_800,
            beam: SpillBeam::V01 {
                good_spill_flag: 1,
                ct_np,
            },
        };
        assert_eq!(record.proton_count(), 2.5e13);
        assert_eq!(record.version(), FormatVersion::V01);
    }
}
