//! Error taxonomy
//!
//! - [`ConfigError`]: rejected threshold tables, fatal at `initialize` only.
//! - [`SensorError`]: per-channel read failures, absorbed by the fail-safe policy.
//! - [`StateError`]: illegal state operations such as resetting outside `Emergency`.
//! - [`LifecycleError`]: out-of-order `start`/`stop`.

use crate::level::Channel;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be a finite number")]
    NonFinite { field: &'static str },

    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },

    #[error("{lower} ({lower_value}) must not exceed {upper} ({upper_value})")]
    Misordered {
        lower: &'static str,
        lower_value: f64,
        upper: &'static str,
        upper_value: f64,
    },

    #[error("power.current_limit_ma ({limit}) must be below power.max_current_ma ({max})")]
    CurrentLimitNotBelowMax { limit: f64, max: f64 },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid restriction pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("thresholds cannot be replaced while the monitor is running")]
    MonitorRunning,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    #[error("{channel} sensor read timed out after {timeout_ms} ms")]
    Timeout { channel: Channel, timeout_ms: u64 },

    #[error("{channel} sensor hardware fault: {message}")]
    Hardware { channel: Channel, message: String },

    #[error("{channel} sensor not ready")]
    NotReady { channel: Channel },

    #[error("{channel} sensor returned a non-finite value ({value})")]
    InvalidReading { channel: Channel, value: f64 },
}

impl SensorError {
    pub fn hardware(channel: Channel, message: impl Into<String>) -> Self {
        SensorError::Hardware {
            channel,
            message: message.into(),
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            SensorError::Timeout { channel, .. }
            | SensorError::Hardware { channel, .. }
            | SensorError::NotReady { channel }
            | SensorError::InvalidReading { channel, .. } => *channel,
        }
    }

    /// The same fault attributed to `channel`.
    pub fn with_channel(self, channel: Channel) -> Self {
        match self {
            SensorError::Timeout { timeout_ms, .. } => SensorError::Timeout {
                channel,
                timeout_ms,
            },
            SensorError::Hardware { message, .. } => SensorError::Hardware { channel, message },
            SensorError::NotReady { .. } => SensorError::NotReady { channel },
            SensorError::InvalidReading { value, .. } => {
                SensorError::InvalidReading { channel, value }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("reset is only permitted in the emergency level")]
    NotInEmergency,

    #[error("monitor has not been initialized")]
    NotInitialized,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("monitor must be initialized before starting")]
    NotInitialized,

    #[error("monitor is already running")]
    AlreadyRunning,

    #[error("monitor was never started")]
    NotStarted,

    #[error("sampling task terminated abnormally: {0}")]
    TaskFailed(String),
}
