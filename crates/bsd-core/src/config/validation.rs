//! Semantic validation for configuration files.
//!
//! Values that parse but cannot drive a run (zero DIFs, non-positive
//! thresholds, NaN) are rejected before any input is opened.

use thiserror::Error;

use super::{BsdConfig, SpillCuts};

/// Errors that can occur during semantic validation.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("n_difs must be at least 1")]
    NoDifs,

    #[error("{field} must be finite and positive (got {value})")]
    NonPositive { field: &'static str, value: f64 },

    #[error("horn_tolerance must be finite and non-negative (got {value})")]
    NegativeTolerance { value: f64 },

    #[error("progress_interval must be at least 1")]
    ZeroProgressInterval,

    #[error("expected_version must not be empty")]
    EmptyVersion,
}

/// Validate a loaded configuration.
pub fn validate_config(config: &BsdConfig) -> Result<(), ValidationError> {
    if config.n_difs == 0 {
        return Err(ValidationError::NoDifs);
    }
    if config.progress_interval == 0 {
        return Err(ValidationError::ZeroProgressInterval);
    }
    if config.expected_version.trim().is_empty() {
        return Err(ValidationError::EmptyVersion);
    }
    validate_cuts(&config.cuts)
}

fn validate_cuts(cuts: &SpillCuts) -> Result<(), ValidationError> {
    for (field, value) in [
        ("min_protons", cuts.min_protons),
        ("max_mumon_center", cuts.max_mumon_center),
        ("horn_current", cuts.horn_current),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return Err(ValidationError::NonPositive { field, value });
        }
    }
    if !cuts.horn_tolerance.is_finite() || cuts.horn_tolerance < 0.0 {
        return Err(ValidationError::NegativeTolerance {
            value: cuts.horn_tolerance,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&BsdConfig::default()), Ok(()));
    }

    #[test]
    fn zero_difs() {
        let config = BsdConfig {
            n_difs: 0,
            ..BsdConfig::default()
        };
        assert_eq!(validate_config(&config), Err(ValidationError::NoDifs));
    }

    #[test]
    fn zero_progress_interval() {
        let config = BsdConfig {
            progress_interval: 0,
            ..BsdConfig::default()
        };
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::ZeroProgressInterval)
        );
    }

    #[test]
    fn non_positive_thresholds() {
        let mut config = BsdConfig::default();
        config.cuts.min_protons = 0.0;
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::NonPositive {
                field: "min_protons",
                ..
            })
        ));

        let mut config = BsdConfig::default();
        config.cuts.max_mumon_center = f64::NAN;
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::NonPositive {
                field: "max_mumon_center",
                ..
            })
        ));
    }

    #[test]
    fn zero_tolerance_allowed() {
        let mut config = BsdConfig::default();
        config.cuts.horn_tolerance = 0.0;
        assert_eq!(validate_config(&config), Ok(()));

        config.cuts.horn_tolerance = -1.0;
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::NegativeTolerance { .. })
        ));
    }

    #[test]
    fn empty_version() {
        let config = BsdConfig {
            expected_version: "  ".to_string(),
            ..BsdConfig::default()
        };
        assert_eq!(validate_config(&config), Err(ValidationError::EmptyVersion));
    }
}
