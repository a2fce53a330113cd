//! Spill classification.
//!
//! Turns one spill record into an accept/reject verdict with a beam polarity.
//! The rule set is chosen by the record's format version:
//!
//! - `v01`: the `good_spill_flag` alone decides (1 neutrino, -1 antineutrino).
//! - `p06`: quality cuts in a fixed order (first failing cut wins), then the
//!   sign of the three horn currents decides the polarity.

use std::collections::BTreeMap;

use bsd_common::spill::{HornTable, ProtonTable, MUMON_CHANNELS};
use bsd_common::{SpillBeam, SpillRecord};
use serde::{Deserialize, Serialize};

use crate::config::SpillCuts;

/// Why a spill was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// v01 `good_spill_flag` was neither 1 nor -1.
    BadQualityFlag,
    /// p06 `spill_flag != 1`.
    SpillFlag,
    /// p06 `run_type != 1`.
    RunType,
    /// Protons on target below the intensity cut.
    LowIntensity,
    /// Muon-monitor profile center too far off axis.
    MuonCenter,
    /// Horn currents matched neither polarity.
    HornCurrent,
}

impl RejectReason {
    pub const ALL: [RejectReason; 6] = [
        RejectReason::BadQualityFlag,
        RejectReason::SpillFlag,
        RejectReason::RunType,
        RejectReason::LowIntensity,
        RejectReason::MuonCenter,
        RejectReason::HornCurrent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::BadQualityFlag => "bad_quality_flag",
            RejectReason::SpillFlag => "spill_flag",
            RejectReason::RunType => "run_type",
            RejectReason::LowIntensity => "low_intensity",
            RejectReason::MuonCenter => "muon_center",
            RejectReason::HornCurrent => "horn_current",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Beam polarity of an accepted spill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Forward horn current (FHC).
    Neutrino,
    /// Reverse horn current (RHC).
    Antineutrino,
}

impl Polarity {
    /// Flag written to the report files: 0 neutrino, 1 antineutrino.
    pub fn flag(&self) -> u8 {
        match self {
            Polarity::Neutrino => 0,
            Polarity::Antineutrino => 1,
        }
    }
}

/// Classification outcome for one spill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Rejected(RejectReason),
    AcceptedNeutrinoMode,
    AcceptedAntineutrinoMode,
}

impl Verdict {
    pub fn polarity(&self) -> Option<Polarity> {
        match self {
            Verdict::Rejected(_) => None,
            Verdict::AcceptedNeutrinoMode => Some(Polarity::Neutrino),
            Verdict::AcceptedAntineutrinoMode => Some(Polarity::Antineutrino),
        }
    }

    pub fn is_accepted(&self) -> bool {
        !matches!(self, Verdict::Rejected(_))
    }
}

/// Per-reason rejection counts, in reason order.
pub type RejectionTally = BTreeMap<RejectReason, u64>;

/// Stateless spill classifier over a fixed cut set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpillClassifier {
    cuts: SpillCuts,
}

impl SpillClassifier {
    pub fn new(cuts: SpillCuts) -> Self {
        SpillClassifier { cuts }
    }

    pub fn cuts(&self) -> &SpillCuts {
        &self.cuts
    }

    pub fn classify(&self, record: &SpillRecord) -> Verdict {
        match &record.beam {
            SpillBeam::V01 {
                good_spill_flag, ..
            } => classify_v01(*good_spill_flag),
            SpillBeam::P06 {
                spill_flag,
                run_type,
                ct_np,
                hct,
                mumon,
            } => self.classify_p06(*spill_flag, *run_type, ct_np, hct, mumon),
        }
    }

    fn classify_p06(
        &self,
        spill_flag: i32,
        run_type: i32,
        ct_np: &ProtonTable,
        hct: &HornTable,
        mumon: &[f64; MUMON_CHANNELS],
    ) -> Verdict {
        if spill_flag != 1 {
            return Verdict::Rejected(RejectReason::SpillFlag);
        }
        if run_type != 1 {
            return Verdict::Rejected(RejectReason::RunType);
        }
        let pot = ct_np[4][0];
        if pot.is_nan() || pot < self.cuts.min_protons {
            return Verdict::Rejected(RejectReason::LowIntensity);
        }
        let center = mumon_center(mumon);
        if center.is_nan() || center > self.cuts.max_mumon_center {
            return Verdict::Rejected(RejectReason::MuonCenter);
        }

        if self.horns_at(hct, self.cuts.horn_current) {
            Verdict::AcceptedNeutrinoMode
        } else if self.horns_at(hct, -self.cuts.horn_current) {
            Verdict::AcceptedAntineutrinoMode
        } else {
            Verdict::Rejected(RejectReason::HornCurrent)
        }
    }

    /// All three horns within tolerance (inclusive) of `nominal`.
    fn horns_at(&self, hct: &HornTable, nominal: f64) -> bool {
        hct.iter()
            .all(|horn| (horn[0] - nominal).abs() <= self.cuts.horn_tolerance)
    }
}

fn classify_v01(good_spill_flag: i32) -> Verdict {
    match good_spill_flag {
        1 => Verdict::AcceptedNeutrinoMode,
        -1 => Verdict::AcceptedAntineutrinoMode,
        _ => Verdict::Rejected(RejectReason::BadQualityFlag),
    }
}

/// Distance of the muon-monitor profile center from the beam axis.
pub fn mumon_center(mumon: &[f64; MUMON_CHANNELS]) -> f64 {
    mumon[2].hypot(mumon[4])
}
