//! Fuzz target for Pyrame XML topology parsing.

#![no_main]

use bsd_core::topology::pyrame::parse_xml_str;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(xml) = std::str::from_utf8(data) {
        let _ = parse_xml_str(xml);
    }
});
