//! Exit codes for the bsd-core CLI.
//!
//! Exit codes communicate the run outcome without requiring output parsing.
//! Every error kind has its own status so wrapper scripts can tell a bad
//! topology from a bad input file.
//!
//! - 0: success
//! - 10-19: argument, input, topology, format and config errors
//! - 21: I/O failure on report files or directories

use bsd_common::Error;

/// Exit codes for bsd-core runs.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Success (0)
    // ========================================================================
    /// Run completed and summaries were written
    Success = 0,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Input file missing or not a spill table
    EmptyInputFile = 11,

    /// DIF index outside the configured range
    WrongDif = 12,

    /// Topology source is neither JSON nor a Pyrame XML file
    TopologyError = 13,

    /// DIF index in range but absent from the topology
    UnknownDif = 14,

    /// Spill table could not be opened for the DIF
    FailedOpenTreeFile = 15,

    /// Spill table entry could not be read
    FailedReadTree = 16,

    /// Format version without a classification rule set
    UnsupportedVersion = 17,

    /// Input format version differs from the expected one
    VersionMismatch = 18,

    /// Configuration file invalid
    ConfigError = 19,

    // ========================================================================
    // Output Errors
    // ========================================================================
    /// I/O error on output sinks or directories
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Success => "WG_SUCCESS",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::EmptyInputFile => "ERR_EMPTY_INPUT_FILE",
            ExitCode::WrongDif => "ERR_WRONG_DIF",
            ExitCode::TopologyError => "ERR_TOPOLOGY",
            ExitCode::UnknownDif => "ERR_UNKNOWN_DIF",
            ExitCode::FailedOpenTreeFile => "ERR_FAILED_OPEN_TREE_FILE",
            ExitCode::FailedReadTree => "ERR_FAILED_READ_TREE",
            ExitCode::UnsupportedVersion => "ERR_UNSUPPORTED_VERSION",
            ExitCode::VersionMismatch => "ERR_VERSION_MISMATCH",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::InputNotFound { .. } => ExitCode::EmptyInputFile,
            Error::InvalidDif { .. } => ExitCode::WrongDif,
            Error::Topology(_) => ExitCode::TopologyError,
            Error::UnknownDif { .. } => ExitCode::UnknownDif,
            Error::StreamOpen { .. } => ExitCode::FailedOpenTreeFile,
            Error::StreamRead { .. } => ExitCode::FailedReadTree,
            Error::UnsupportedVersion { .. } => ExitCode::UnsupportedVersion,
            Error::VersionMismatch { .. } => ExitCode::VersionMismatch,
            Error::Config(_) => ExitCode::ConfigError,
            Error::Io { .. } => ExitCode::IoError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
