//! Fuzz target for bsd config parsing.
//!
//! Tests that config parsing and validation handle arbitrary input
//! without panicking.

#![no_main]

use bsd_core::config::validate_config;
use bsd_core::BsdConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = serde_json::from_str::<BsdConfig>(text) {
        let _ = validate_config(&config);
    }
    if let Ok(config) = toml::from_str::<BsdConfig>(text) {
        let _ = validate_config(&config);
    }
});
