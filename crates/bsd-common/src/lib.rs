//! Beam summary common types and errors.
//!
//! This crate provides foundational types shared across the bsd crates:
//! - Spill record types, one payload variant per beam summary format version
//! - The unified error type with stable codes
//! - Output formats for the run summary

pub mod error;
pub mod output;
pub mod spill;

pub use error::{format_error_human, Error, ErrorCategory, Result, StructuredError};
pub use output::OutputFormat;
pub use spill::{FormatVersion, SpillBeam, SpillRecord};

/// Schema version for machine-readable run reports.
pub const SCHEMA_VERSION: &str = "1.0.0";
