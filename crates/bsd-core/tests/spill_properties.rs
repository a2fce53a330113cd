//! Property-based tests for spill classification and POT accumulation.

use bsd_common::spill::{CT_NP_COLS, CT_NP_ROWS, HCT_COLS, HCT_ROWS, MUMON_CHANNELS};
use bsd_common::{SpillBeam, SpillRecord};
use bsd_core::{PotAccumulator, RejectReason, SpillClassifier, SpillCuts, Verdict};
use proptest::prelude::*;

fn v01(good_spill_flag: i32, pot: f64) -> SpillRecord {
    let mut ct_np = [[0.0; CT_NP_COLS]; CT_NP_ROWS];
    ct_np[4][0] = pot;
    SpillRecord {
        spill_number: 1,
        spill_count: 1,
        trigger_seconds: 0,
        beam: SpillBeam::V01 {
            good_spill_flag,
            ct_np,
        },
    }
}

#[derive(Debug, Clone)]
struct P06Fields {
    spill_flag: i32,
    run_type: i32,
    pot: f64,
    mumon_x: f64,
    mumon_y: f64,
    horns: [f64; 3],
}

impl P06Fields {
    fn record(&self) -> SpillRecord {
        let mut ct_np = [[0.0; CT_NP_COLS]; CT_NP_ROWS];
        ct_np[4][0] = self.pot;
        let mut hct = [[0.0; HCT_COLS]; HCT_ROWS];
        for (row, current) in hct.iter_mut().zip(self.horns) {
            row[0] = current;
        }
        let mut mumon = [0.0; MUMON_CHANNELS];
        mumon[2] = self.mumon_x;
        mumon[4] = self.mumon_y;
        SpillRecord {
            spill_number: 1,
            spill_count: 1,
            trigger_seconds: 0,
            beam: SpillBeam::P06 {
                spill_flag: self.spill_flag,
                run_type: self.run_type,
                ct_np,
                hct,
                mumon,
            },
        }
    }
}

fn p06_strategy() -> impl Strategy<Value = P06Fields> {
    (
        prop_oneof![Just(1), -2i32..3],
        prop_oneof![Just(1), -2i32..3],
        prop_oneof![1e9f64..1e14, Just(1e11)],
        -12.0f64..12.0,
        -12.0f64..12.0,
        prop_oneof![Just(250.0), Just(-250.0), -260.0f64..260.0],
    )
        .prop_map(|(spill_flag, run_type, pot, mumon_x, mumon_y, horn)| P06Fields {
            spill_flag,
            run_type,
            pot,
            mumon_x,
            mumon_y,
            horns: [horn, horn, horn],
        })
}

fn verdict_strategy() -> impl Strategy<Value = (Verdict, f64)> {
    (
        prop_oneof![
            Just(Verdict::AcceptedNeutrinoMode),
            Just(Verdict::AcceptedAntineutrinoMode),
            (0..RejectReason::ALL.len()).prop_map(|i| Verdict::Rejected(RejectReason::ALL[i])),
        ],
        0.0f64..5e13,
    )
}

proptest! {
    #[test]
    fn v01_flag_partitions_spills(flag in any::<i32>(), pot in 0.0f64..1e14) {
        let verdict = SpillClassifier::default().classify(&v01(flag, pot));
        let expected = match flag {
            1 => Verdict::AcceptedNeutrinoMode,
            -1 => Verdict::AcceptedAntineutrinoMode,
            _ => Verdict::Rejected(RejectReason::BadQualityFlag),
        };
        prop_assert_eq!(verdict, expected);
    }

    #[test]
    fn p06_first_failing_rule_wins(fields in p06_strategy()) {
        let cuts = SpillCuts::default();
        let verdict = SpillClassifier::new(cuts).classify(&fields.record());
        let center = fields.mumon_x.hypot(fields.mumon_y);
        let horn = fields.horns[0];

        let expected = if fields.spill_flag != 1 {
            Verdict::Rejected(RejectReason::SpillFlag)
        } else if fields.run_type != 1 {
            Verdict::Rejected(RejectReason::RunType)
        } else if fields.pot < cuts.min_protons {
            Verdict::Rejected(RejectReason::LowIntensity)
        } else if center > cuts.max_mumon_center {
            Verdict::Rejected(RejectReason::MuonCenter)
        } else if (horn - cuts.horn_current).abs() <= cuts.horn_tolerance {
            Verdict::AcceptedNeutrinoMode
        } else if (horn + cuts.horn_current).abs() <= cuts.horn_tolerance {
            Verdict::AcceptedAntineutrinoMode
        } else {
            Verdict::Rejected(RejectReason::HornCurrent)
        };
        prop_assert_eq!(verdict, expected);
    }

    #[test]
    fn p06_bad_spill_flag_rejects_otherwise_good_spill(flag in any::<i32>()) {
        prop_assume!(flag != 1);
        let fields = P06Fields {
            spill_flag: flag,
            run_type: 1,
            pot: 2e13,
            mumon_x: 0.0,
            mumon_y: 0.0,
            horns: [250.0; 3],
        };
        prop_assert_eq!(
            SpillClassifier::default().classify(&fields.record()),
            Verdict::Rejected(RejectReason::SpillFlag)
        );
    }

    #[test]
    fn accumulator_invariant_after_every_record(
        steps in prop::collection::vec(verdict_strategy(), 0..200)
    ) {
        let mut acc = PotAccumulator::new();
        let mut accepted = 0u64;
        for (verdict, pot) in &steps {
            let summary = acc.apply(*verdict, *pot);
            if verdict.is_accepted() {
                accepted += 1;
            }
            prop_assert!(summary.invariant_holds());
            prop_assert_eq!(summary.accepted_spill_count, accepted);
        }
        prop_assert_eq!(acc.summary().total_spills(), steps.len() as u64);
    }

    #[test]
    fn accumulation_is_idempotent_from_cold_start(
        steps in prop::collection::vec(verdict_strategy(), 0..100)
    ) {
        let run = |steps: &[(Verdict, f64)]| {
            let mut acc = PotAccumulator::new();
            for (verdict, pot) in steps {
                acc.apply(*verdict, *pot);
            }
            acc.into_summary()
        };
        prop_assert_eq!(run(&steps), run(&steps));
    }

    #[test]
    fn rejected_spills_never_add_pot(
        reasons in prop::collection::vec(0..RejectReason::ALL.len(), 1..50),
        pot in 1e11f64..1e14
    ) {
        let mut acc = PotAccumulator::new();
        for i in &reasons {
            acc.apply(Verdict::Rejected(RejectReason::ALL[*i]), pot);
        }
        let summary = acc.summary();
        prop_assert_eq!(summary.accepted_spill_count, 0);
        prop_assert_eq!(summary.accepted_pot_total, 0.0);
        prop_assert_eq!(summary.rejected_spill_count, reasons.len() as u64);
        let tallied: u64 = summary.rejections.values().sum();
        prop_assert_eq!(tallied, reasons.len() as u64);
    }
}
