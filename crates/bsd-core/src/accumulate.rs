//! Protons-on-target accumulation.
//!
//! Running spill counts and POT sums, per polarity and combined, updated once
//! per classified spill in record order.

use serde::{Deserialize, Serialize};

use crate::classify::{RejectReason, RejectionTally, Verdict};

/// Relative tolerance for the combined-vs-split POT invariant.
const POT_TOLERANCE: f64 = 1e-9;

/// Run-level totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub accepted_spill_count: u64,
    pub accepted_pot_total: f64,
    pub neutrino_spill_count: u64,
    pub neutrino_pot_total: f64,
    pub antineutrino_spill_count: u64,
    pub antineutrino_pot_total: f64,
    /// Diagnostic only; not part of the accepted totals.
    pub rejected_spill_count: u64,
    #[serde(default, skip_serializing_if = "RejectionTally::is_empty")]
    pub rejections: RejectionTally,
}

impl RunSummary {
    /// Spills seen, accepted or not.
    pub fn total_spills(&self) -> u64 {
        self.accepted_spill_count + self.rejected_spill_count
    }

    pub fn rejected_for(&self, reason: RejectReason) -> u64 {
        self.rejections.get(&reason).copied().unwrap_or(0)
    }

    /// Combined totals equal the per-polarity sums.
    pub fn invariant_holds(&self) -> bool {
        let split_pot = self.neutrino_pot_total + self.antineutrino_pot_total;
        let scale = self.accepted_pot_total.abs().max(split_pot.abs()).max(1.0);
        self.accepted_spill_count == self.neutrino_spill_count + self.antineutrino_spill_count
            && (self.accepted_pot_total - split_pot).abs() <= POT_TOLERANCE * scale
    }
}

/// Owns the running totals for one run.
#[derive(Debug, Clone, Default)]
pub struct PotAccumulator {
    summary: RunSummary,
}

impl PotAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one verdict into the totals and return the updated state.
    pub fn apply(&mut self, verdict: Verdict, proton_count: f64) -> &RunSummary {
        let s = &mut self.summary;
        match verdict {
            Verdict::Rejected(reason) => {
                s.rejected_spill_count += 1;
                *s.rejections.entry(reason).or_insert(0) += 1;
            }
            Verdict::AcceptedNeutrinoMode => {
                s.neutrino_spill_count += 1;
                s.neutrino_pot_total += proton_count;
                s.accepted_spill_count += 1;
                s.accepted_pot_total += proton_count;
            }
            Verdict::AcceptedAntineutrinoMode => {
                s.antineutrino_spill_count += 1;
                s.antineutrino_pot_total += proton_count;
                s.accepted_spill_count += 1;
                s.accepted_pot_total += proton_count;
            }
        }
        &self.summary
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn into_summary(self) -> RunSummary {
        self.summary
    }
}
