//! Violation Log
//!
//! Append-only, bounded, timestamped audit trail of threshold breaches,
//! fail-safe escalations and blocked processes. When full, the oldest
//! record is evicted, except the record of the most recent emergency
//! transition, which always survives.

use crate::evaluator::ViolationDetail;
use crate::level::{Channel, SafetyLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of records retained.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    Thermal,
    Power,
    Neural,
    Process,
    /// A channel's sensor reached its failure limit
    Sensor,
}

impl From<Channel> for ViolationCategory {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Thermal => ViolationCategory::Thermal,
            Channel::Power => ViolationCategory::Power,
            Channel::Neural => ViolationCategory::Neural,
        }
    }
}

/// What was observed when the violation was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Observation {
    Reading { value: f64, threshold: f64 },
    Process { name: String, rule: String },
    SensorFailure { channel: Channel, consecutive_failures: u32 },
    /// Every channel is in fail-safe at once
    SensorBlackout { failure_limit: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// Monotonic per-log sequence number
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub category: ViolationCategory,
    pub observation: Observation,
    /// Level the record is associated with
    pub level: SafetyLevel,
    /// This record caused an emergency transition
    pub triggered_emergency: bool,
    pub message: String,
}

/// Unsequenced record contents; [`ViolationLog::append`] assigns the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct NewViolation {
    pub category: ViolationCategory,
    pub observation: Observation,
    pub level: SafetyLevel,
    pub triggered_emergency: bool,
    pub message: String,
}

impl NewViolation {
    pub fn threshold(detail: &ViolationDetail, level: SafetyLevel) -> Self {
        Self {
            category: detail.channel.into(),
            observation: Observation::Reading {
                value: detail.value,
                threshold: detail.threshold,
            },
            level,
            triggered_emergency: false,
            message: detail.describe(),
        }
    }

    pub fn process(name: &str, rule: &str, level: SafetyLevel) -> Self {
        Self {
            category: ViolationCategory::Process,
            observation: Observation::Process {
                name: name.to_string(),
                rule: rule.to_string(),
            },
            level,
            triggered_emergency: false,
            message: format!("process '{}' blocked by restriction '{}'", name, rule),
        }
    }

    pub fn sensor_failure(channel: Channel, consecutive_failures: u32, level: SafetyLevel) -> Self {
        Self {
            category: ViolationCategory::Sensor,
            observation: Observation::SensorFailure {
                channel,
                consecutive_failures,
            },
            level,
            triggered_emergency: false,
            message: format!(
                "{} sensor failed {} consecutive reads, forcing fail-safe",
                channel, consecutive_failures
            ),
        }
    }

    pub fn sensor_blackout(failure_limit: u32) -> Self {
        Self {
            category: ViolationCategory::Sensor,
            observation: Observation::SensorBlackout { failure_limit },
            level: SafetyLevel::Emergency,
            triggered_emergency: false,
            message: format!(
                "all sensors failed at least {} consecutive reads, no protective coverage left",
                failure_limit
            ),
        }
    }

    pub fn triggering_emergency(mut self) -> Self {
        self.triggered_emergency = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ViolationLog {
    records: VecDeque<ViolationRecord>,
    capacity: usize,
    next_sequence: u64,
    /// Sequence of the latest emergency-triggering record
    pinned: Option<u64>,
    total: u64,
}

impl Default for ViolationLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl ViolationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
            capacity: capacity.max(1),
            next_sequence: 1,
            pinned: None,
            total: 0,
        }
    }

    /// Append a record and return its sequence number.
    pub fn append(&mut self, violation: NewViolation) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.total += 1;

        if violation.triggered_emergency {
            self.pinned = Some(sequence);
        }

        self.records.push_back(ViolationRecord {
            sequence,
            timestamp: Utc::now(),
            category: violation.category,
            observation: violation.observation,
            level: violation.level,
            triggered_emergency: violation.triggered_emergency,
            message: violation.message,
        });

        while self.records.len() > self.capacity {
            self.evict_one();
        }
        sequence
    }

    fn evict_one(&mut self) {
        let victim = self
            .records
            .iter()
            .position(|r| Some(r.sequence) != self.pinned)
            .unwrap_or(0);
        if let Some(evicted) = self.records.remove(victim) {
            tracing::trace!("Evicted violation record #{}", evicted.sequence);
        }
    }

    /// Newest last. `limit` keeps only the most recent `limit` records.
    pub fn recent(&self, limit: Option<usize>) -> Vec<ViolationRecord> {
        let skip = limit
            .map(|n| self.records.len().saturating_sub(n))
            .unwrap_or(0);
        self.records.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the bound, evicting immediately if the log is over it.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.records.len() > self.capacity {
            self.evict_one();
        }
    }

    /// Records ever appended, including evicted ones.
    pub fn total_recorded(&self) -> u64 {
        self.total
    }

    pub fn latest_emergency(&self) -> Option<&ViolationRecord> {
        let pinned = self.pinned?;
        self.records.iter().find(|r| r.sequence == pinned)
    }
}

// ============================================================================
// Tests
// ============================================================================
