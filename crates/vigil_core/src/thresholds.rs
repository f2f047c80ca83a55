//! Threshold tables
//!
//! Pure configuration data: ordered boundaries per channel plus the process
//! restriction table. Each table can check its own ordering; evaluation lives
//! in [`crate::evaluator`].

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// Thermal
// ============================================================================

/// Temperature boundaries in °C.
///
/// Must satisfy `warning <= throttling <= critical <= emergency <= max_allowed`,
/// so that shutdown fires no later than the absolute maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalThresholds {
    pub warning_threshold: f64,
    pub throttling_threshold: f64,
    pub critical_threshold: f64,
    pub emergency_threshold: f64,
    /// Absolute maximum, never to be exceeded
    pub max_allowed: f64,
}

impl Default for ThermalThresholds {
    fn default() -> Self {
        Self {
            warning_threshold: 45.0,
            throttling_threshold: 50.0,
            critical_threshold: 55.0,
            emergency_threshold: 60.0,
            max_allowed: 60.0,
        }
    }
}

impl ThermalThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ladder = [
            ("thermal.warning_threshold", self.warning_threshold),
            ("thermal.throttling_threshold", self.throttling_threshold),
            ("thermal.critical_threshold", self.critical_threshold),
            ("thermal.emergency_threshold", self.emergency_threshold),
            ("thermal.max_allowed", self.max_allowed),
        ];
        check_finite_non_negative(&ladder)?;
        check_ascending(&ladder)
    }
}

// ============================================================================
// Power
// ============================================================================

/// Current boundaries in mA.
///
/// `current_limit_ma` is a soft cap enforced before the hard `max_current_ma`
/// cutoff and must sit strictly below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerThresholds {
    pub normal_current_ma: f64,
    pub warning_current_ma: f64,
    pub critical_current_ma: f64,
    pub max_current_ma: f64,
    pub current_limit_ma: f64,
}

impl Default for PowerThresholds {
    fn default() -> Self {
        Self {
            normal_current_ma: 100.0,
            warning_current_ma: 500.0,
            critical_current_ma: 1000.0,
            max_current_ma: 2000.0,
            current_limit_ma: 1500.0,
        }
    }
}

impl PowerThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ladder = [
            ("power.normal_current_ma", self.normal_current_ma),
            ("power.warning_current_ma", self.warning_current_ma),
            ("power.critical_current_ma", self.critical_current_ma),
            ("power.max_current_ma", self.max_current_ma),
        ];
        check_finite_non_negative(&ladder)?;
        check_finite_non_negative(&[("power.current_limit_ma", self.current_limit_ma)])?;
        check_ascending(&ladder)?;

        if self.current_limit_ma >= self.max_current_ma {
            return Err(ConfigError::CurrentLimitNotBelowMax {
                limit: self.current_limit_ma,
                max: self.max_current_ma,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Neural
// ============================================================================

/// Neural activity boundaries in µV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuralSafetyThresholds {
    pub normal_eeg_uv: f64,
    pub seizure_threshold_uv: f64,
    pub critical_threshold_uv: f64,
    /// Informational only; does not gate any decision
    pub sampling_rate_hz: u32,
}

impl Default for NeuralSafetyThresholds {
    fn default() -> Self {
        Self {
            normal_eeg_uv: 100.0,
            seizure_threshold_uv: 500.0,
            critical_threshold_uv: 1000.0,
            sampling_rate_hz: 256,
        }
    }
}

impl NeuralSafetyThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ladder = [
            ("neural.normal_eeg_uv", self.normal_eeg_uv),
            ("neural.seizure_threshold_uv", self.seizure_threshold_uv),
            ("neural.critical_threshold_uv", self.critical_threshold_uv),
        ];
        check_finite_non_negative(&ladder)?;
        check_ascending(&ladder)?;

        if self.sampling_rate_hz == 0 {
            return Err(ConfigError::Zero {
                field: "neural.sampling_rate_hz",
            });
        }
        Ok(())
    }
}

// ============================================================================
// Process restrictions
// ============================================================================

/// Processes that must not run on the protected device.
///
/// A name is restricted if it equals an entry of `restricted_processes` or
/// contains an entry of `restricted_patterns`. Both comparisons ignore case;
/// `*` inside a pattern matches any run of characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessRestrictions {
    pub restricted_processes: BTreeSet<String>,
    pub restricted_patterns: BTreeSet<String>,
}

impl Default for ProcessRestrictions {
    fn default() -> Self {
        Self {
            restricted_processes: ["cpu-burn", "stress-ng", "prime95", "folding@home"]
                .into_iter()
                .map(String::from)
                .collect(),
            restricted_patterns: ["cpu*burn", "stress", "prime", "fah"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl ProcessRestrictions {
    /// An empty table that restricts nothing.
    pub fn none() -> Self {
        Self {
            restricted_processes: BTreeSet::new(),
            restricted_patterns: BTreeSet::new(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn check_finite_non_negative(fields: &[(&'static str, f64)]) -> Result<(), ConfigError> {
    for &(field, value) in fields {
        if !value.is_finite() {
            return Err(ConfigError::NonFinite { field });
        }
        if value < 0.0 {
            return Err(ConfigError::Negative { field, value });
        }
    }
    Ok(())
}

fn check_ascending(fields: &[(&'static str, f64)]) -> Result<(), ConfigError> {
    for pair in fields.windows(2) {
        let (lower, lower_value) = pair[0];
        let (upper, upper_value) = pair[1];
        if lower_value > upper_value {
            return Err(ConfigError::Misordered {
                lower,
                lower_value,
                upper,
                upper_value,
            });
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
