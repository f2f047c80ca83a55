//! Point-in-time view of the monitor, produced on demand.

use crate::level::{Channel, SafetyLevel};
use crate::reason::ShutdownReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One value per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerChannel<T> {
    pub thermal: T,
    pub power: T,
    pub neural: T,
}

impl<T: Copy> PerChannel<T> {
    pub fn get(&self, channel: Channel) -> T {
        match channel {
            Channel::Thermal => self.thermal,
            Channel::Power => self.power,
            Channel::Neural => self.neural,
        }
    }

    pub fn from_fn(mut f: impl FnMut(Channel) -> T) -> Self {
        Self {
            thermal: f(Channel::Thermal),
            power: f(Channel::Power),
            neural: f(Channel::Neural),
        }
    }
}

/// Safety state at the moment of the call. Does not update afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetySnapshot {
    pub level: SafetyLevel,
    /// Sampling task is running
    pub is_active: bool,
    /// Latched and every shutdown callback has returned
    pub is_emergency: bool,
    /// Latched but shutdown callbacks are still running
    pub shutdown_in_progress: bool,
    /// Last successful reading per channel (°C, mA, µV)
    pub last_readings: PerChannel<Option<f64>>,
    /// Mean over the retained reading history
    pub average_readings: PerChannel<Option<f64>>,
    pub consecutive_failures: PerChannel<u32>,
    pub shutdown_count: u64,
    /// Violations ever recorded, including evicted ones
    pub violation_count: u64,
    pub last_shutdown: Option<ShutdownReason>,
    pub ticks: u64,
    pub captured_at: DateTime<Utc>,
}
