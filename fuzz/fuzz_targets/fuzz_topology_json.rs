//! Fuzz target for JSON topology parsing.
//!
//! Arbitrary text must parse or fail with a `TopologyError`, never panic.

#![no_main]

use bsd_core::topology::parse_structured;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(src) = std::str::from_utf8(data) {
        if let Ok(topology) = parse_structured(src) {
            // Every listed DIF must answer a chip count.
            for dif in topology.dif_indices() {
                assert!(topology.chip_count(dif).is_ok());
            }
        }
    }
});
