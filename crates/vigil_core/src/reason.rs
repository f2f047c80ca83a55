//! Emergency shutdown reasons

use crate::evaluator::ViolationDetail;
use crate::level::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the emergency latch was engaged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShutdownCause {
    ThermalRunaway,
    PowerSurge,
    NeuralAnomaly,
    ProcessViolation { process: String },
    ManualTrigger,
    /// Every channel lost its sensor at once
    SensorFailureFailSafe,
    /// The sampling tick itself failed
    SystemFailure,
}

impl ShutdownCause {
    pub fn for_channel(channel: Channel) -> Self {
        match channel {
            Channel::Thermal => ShutdownCause::ThermalRunaway,
            Channel::Power => ShutdownCause::PowerSurge,
            Channel::Neural => ShutdownCause::NeuralAnomaly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownCause::ThermalRunaway => "thermal_runaway",
            ShutdownCause::PowerSurge => "power_surge",
            ShutdownCause::NeuralAnomaly => "neural_anomaly",
            ShutdownCause::ProcessViolation { .. } => "process_violation",
            ShutdownCause::ManualTrigger => "manual_trigger",
            ShutdownCause::SensorFailureFailSafe => "sensor_failure_fail_safe",
            ShutdownCause::SystemFailure => "system_failure",
        }
    }
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownCause::ProcessViolation { process } => {
                write!(f, "process_violation ({})", process)
            }
            other => f.write_str(other.as_str()),
        }
    }
}

/// One emergency entry: cause, triggering reading and boundary, and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutdownReason {
    pub cause: ShutdownCause,
    pub reading: Option<f64>,
    pub threshold: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl ShutdownReason {
    pub fn new(cause: ShutdownCause) -> Self {
        Self {
            cause,
            reading: None,
            threshold: None,
            timestamp: Utc::now(),
        }
    }

    pub fn from_violation(detail: &ViolationDetail) -> Self {
        Self {
            cause: ShutdownCause::for_channel(detail.channel),
            reading: Some(detail.value),
            threshold: Some(detail.threshold),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cause)?;
        if let (Some(reading), Some(threshold)) = (self.reading, self.threshold) {
            write!(f, ": reading {:.1} >= threshold {:.1}", reading, threshold)?;
        }
        Ok(())
    }
}
