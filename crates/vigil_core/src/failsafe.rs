//! Per-channel sensor fail-safe tracking
//!
//! A failed read is treated as "no better than the last known good level".
//! After `failure_limit` consecutive failures the channel contributes at
//! least `Critical`, so a dead sensor can never silence the monitor.

use crate::error::SensorError;
use crate::evaluator::Evaluation;
use crate::level::{Channel, SafetyLevel};

/// Default number of consecutive failures before a channel is forced up.
pub const DEFAULT_FAILURE_LIMIT: u32 = 3;

/// Contribution of one channel to the current tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSample {
    /// A fresh reading was evaluated
    Reading(Evaluation),
    /// The read failed; the level is the fail-safe substitute
    Failed {
        error: SensorError,
        level: SafetyLevel,
        consecutive_failures: u32,
        /// Failure limit reached; the level is forced to at least `Critical`
        failsafe: bool,
        /// True on the exact tick the failure limit was reached
        entered_failsafe: bool,
    },
}

impl ChannelSample {
    pub fn level(&self) -> SafetyLevel {
        match self {
            ChannelSample::Reading(eval) => eval.level,
            ChannelSample::Failed { level, .. } => *level,
        }
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        match self {
            ChannelSample::Reading(eval) => Some(eval),
            ChannelSample::Failed { .. } => None,
        }
    }

    pub fn is_failsafe(&self) -> bool {
        matches!(self, ChannelSample::Failed { failsafe: true, .. })
    }
}

/// Health bookkeeping for one channel.
#[derive(Debug, Clone)]
pub struct ChannelHealth {
    channel: Channel,
    failure_limit: u32,
    consecutive_failures: u32,
    last_good_level: SafetyLevel,
    last_reading: Option<f64>,
}

impl ChannelHealth {
    pub fn new(channel: Channel, failure_limit: u32) -> Self {
        Self {
            channel,
            failure_limit: failure_limit.max(1),
            consecutive_failures: 0,
            last_good_level: SafetyLevel::Normal,
            last_reading: None,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Fold one read result into the channel state.
    pub fn observe(&mut self, result: Result<Evaluation, SensorError>) -> ChannelSample {
        match result {
            Ok(eval) => {
                self.consecutive_failures = 0;
                self.last_good_level = eval.level;
                self.last_reading = Some(eval.reading);
                ChannelSample::Reading(eval)
            }
            Err(error) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                ChannelSample::Failed {
                    error,
                    level: self.contribution(),
                    consecutive_failures: self.consecutive_failures,
                    failsafe: self.is_failsafe(),
                    entered_failsafe: self.consecutive_failures == self.failure_limit,
                }
            }
        }
    }

    /// Level this channel contributes while its sensor is unavailable.
    pub fn contribution(&self) -> SafetyLevel {
        if self.is_failsafe() {
            self.last_good_level.max(SafetyLevel::Critical)
        } else {
            self.last_good_level
        }
    }

    pub fn is_failsafe(&self) -> bool {
        self.consecutive_failures >= self.failure_limit
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_reading(&self) -> Option<f64> {
        self.last_reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::evaluate;
    use crate::thresholds::ThermalThresholds;

    fn fault() -> Result<Evaluation, SensorError> {
        Err(SensorError::hardware(Channel::Thermal, "open circuit"))
    }

    #[test]
    fn test_failure_holds_last_good_level() {
        let t = ThermalThresholds::default();
        let mut health = ChannelHealth::new(Channel::Thermal, DEFAULT_FAILURE_LIMIT);

        health.observe(Ok(evaluate(51.0, &t)));
        let sample = health.observe(fault());
        assert_eq!(sample.level(), SafetyLevel::Throttling);
        assert!(!health.is_failsafe());
    }

    #[test]
    fn test_three_failures_force_critical() {
        let mut health = ChannelHealth::new(Channel::Thermal, DEFAULT_FAILURE_LIMIT);

        assert_eq!(health.observe(fault()).level(), SafetyLevel::Normal);
        assert_eq!(health.observe(fault()).level(), SafetyLevel::Normal);

        match health.observe(fault()) {
            ChannelSample::Failed {
                level,
                consecutive_failures,
                failsafe,
                entered_failsafe,
                ..
            } => {
                assert!(failsafe);
                assert_eq!(level, SafetyLevel::Critical);
                assert_eq!(consecutive_failures, 3);
                assert!(entered_failsafe);
            }
            other => panic!("expected failure, got {:?}", other),
        }

        // Still forced, but only the first crossing is flagged
        match health.observe(fault()) {
            ChannelSample::Failed {
                entered_failsafe, ..
            } => assert!(!entered_failsafe),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_failsafe_never_lowers_last_good() {
        let t = ThermalThresholds::default();
        let mut health = ChannelHealth::new(Channel::Thermal, 1);
        health.observe(Ok(evaluate(65.0, &t)));
        assert_eq!(health.observe(fault()).level(), SafetyLevel::Emergency);
    }

    #[test]
    fn test_success_clears_failures() {
        let t = ThermalThresholds::default();
        let mut health = ChannelHealth::new(Channel::Thermal, DEFAULT_FAILURE_LIMIT);
        for _ in 0..3 {
            health.observe(fault());
        }
        assert!(health.is_failsafe());

        let sample = health.observe(Ok(evaluate(20.0, &t)));
        assert_eq!(sample.level(), SafetyLevel::Normal);
        assert_eq!(health.consecutive_failures(), 0);
        assert_eq!(health.last_reading(), Some(20.0));
    }
}
