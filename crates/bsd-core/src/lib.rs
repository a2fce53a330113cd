//! Beam Summary Data Core Library
//!
//! This library provides the beam spill engine:
//! - Detector topology resolution (JSON or Pyrame XML)
//! - Spill classification for each beam summary format version
//! - Protons-on-target accumulation and per-spill report files
//! - The run driver that sequences them over one spill table
//! - Exit codes, configuration and structured logging for the CLI
//!
//! The binary entry point is in `main.rs`.

pub mod accumulate;
pub mod classify;
pub mod config;
pub mod driver;
pub mod exit_codes;
pub mod logging;
pub mod output;
pub mod report;
pub mod topology;

pub use accumulate::{PotAccumulator, RunSummary};
pub use classify::{Polarity, RejectReason, SpillClassifier, Verdict};
pub use config::{BsdConfig, SpillCuts};
pub use driver::{RunDriver, RunInfo, RunOptions, RunOutcome, RunState};
pub use topology::{Topology, TopologyError};
