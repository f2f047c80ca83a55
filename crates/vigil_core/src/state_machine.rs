//! Safety State Machine
//!
//! Holds the aggregate level and applies the transition rules once per tick:
//!
//! - the tick level is the worst of the three channel levels;
//! - entering `Emergency` latches, records exactly one [`ShutdownReason`]
//!   and bumps the shutdown counter;
//! - while latched, sampling-driven levels are ignored until [`reset`];
//! - below `Emergency` the level follows the readings in both directions.
//!
//! [`reset`]: SafetyStateMachine::reset

use crate::error::StateError;
use crate::failsafe::ChannelSample;
use crate::level::{Channel, SafetyLevel};
use crate::reason::{ShutdownCause, ShutdownReason};

/// Per-channel levels of a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelLevels {
    pub thermal: SafetyLevel,
    pub power: SafetyLevel,
    pub neural: SafetyLevel,
}

impl ChannelLevels {
    pub fn get(&self, channel: Channel) -> SafetyLevel {
        match channel {
            Channel::Thermal => self.thermal,
            Channel::Power => self.power,
            Channel::Neural => self.neural,
        }
    }

    /// Never better than the worst individual channel.
    pub fn aggregate(&self) -> SafetyLevel {
        self.thermal.max(self.power).max(self.neural)
    }

    /// First channel at `level`, in thermal > power > neural priority.
    pub fn first_at(&self, level: SafetyLevel) -> Option<Channel> {
        Channel::ALL.into_iter().find(|c| self.get(*c) == level)
    }
}

/// The three channel contributions of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSamples {
    pub thermal: ChannelSample,
    pub power: ChannelSample,
    pub neural: ChannelSample,
}

impl TickSamples {
    pub fn get(&self, channel: Channel) -> &ChannelSample {
        match channel {
            Channel::Thermal => &self.thermal,
            Channel::Power => &self.power,
            Channel::Neural => &self.neural,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, &ChannelSample)> {
        Channel::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    pub fn levels(&self) -> ChannelLevels {
        ChannelLevels {
            thermal: self.thermal.level(),
            power: self.power.level(),
            neural: self.neural.level(),
        }
    }

    /// Every channel has exhausted its failure budget.
    pub fn is_blackout(&self) -> bool {
        self.iter().all(|(_, sample)| sample.is_failsafe())
    }
}

/// Result of applying a tick, a latch or a reset.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub previous: SafetyLevel,
    pub current: SafetyLevel,
    /// Set only on the tick that entered `Emergency`
    pub shutdown: Option<ShutdownReason>,
    /// Channel whose reading caused the emergency, if any
    pub trigger: Option<Channel>,
}

impl Transition {
    fn unchanged(level: SafetyLevel) -> Self {
        Self {
            previous: level,
            current: level,
            shutdown: None,
            trigger: None,
        }
    }

    pub fn changed(&self) -> bool {
        self.previous != self.current
    }

    pub fn escalated(&self) -> bool {
        self.current > self.previous
    }

    pub fn entered_emergency(&self) -> bool {
        self.shutdown.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SafetyStateMachine {
    level: SafetyLevel,
    shutdown_count: u64,
    last_shutdown: Option<ShutdownReason>,
}

impl SafetyStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> SafetyLevel {
        self.level
    }

    pub fn is_emergency(&self) -> bool {
        self.level.is_emergency()
    }

    pub fn shutdown_count(&self) -> u64 {
        self.shutdown_count
    }

    pub fn last_shutdown(&self) -> Option<&ShutdownReason> {
        self.last_shutdown.as_ref()
    }

    /// Apply one sampling tick.
    pub fn apply(&mut self, samples: &TickSamples) -> Transition {
        let previous = self.level;
        if previous.is_emergency() {
            return Transition::unchanged(previous);
        }

        let levels = samples.levels();
        let next = levels.aggregate();

        if next.is_emergency() {
            // aggregate is Emergency, so some channel is at Emergency
            let channel = levels.first_at(SafetyLevel::Emergency).unwrap_or(Channel::Thermal);
            let reason = match samples
                .get(channel)
                .evaluation()
                .and_then(|eval| eval.violation.as_ref())
            {
                Some(violation) => ShutdownReason::from_violation(violation),
                None => ShutdownReason::new(ShutdownCause::for_channel(channel)),
            };
            let mut transition = self.engage(reason);
            transition.trigger = Some(channel);
            return transition;
        }

        if samples.is_blackout() {
            return self.engage(ShutdownReason::new(ShutdownCause::SensorFailureFailSafe));
        }

        self.level = next;
        Transition {
            previous,
            current: next,
            shutdown: None,
            trigger: None,
        }
    }

    /// Latch `Emergency` out-of-band. Returns `None` if already latched.
    pub fn latch(&mut self, reason: ShutdownReason) -> Option<Transition> {
        if self.is_emergency() {
            return None;
        }
        Some(self.engage(reason))
    }

    /// Clear the latch back to `Normal`. Counters and history are kept.
    pub fn reset(&mut self) -> Result<Transition, StateError> {
        if !self.is_emergency() {
            return Err(StateError::NotInEmergency);
        }
        self.level = SafetyLevel::Normal;
        Ok(Transition {
            previous: SafetyLevel::Emergency,
            current: SafetyLevel::Normal,
            shutdown: None,
            trigger: None,
        })
    }

    fn engage(&mut self, reason: ShutdownReason) -> Transition {
        let previous = self.level;
        self.level = SafetyLevel::Emergency;
        self.shutdown_count += 1;
        self.last_shutdown = Some(reason.clone());
        Transition {
            previous,
            current: SafetyLevel::Emergency,
            shutdown: Some(reason),
            trigger: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;
    use crate::evaluator::evaluate;
    use crate::thresholds::{NeuralSafetyThresholds, PowerThresholds, ThermalThresholds};

    fn samples(temp: f64, current: f64, neural: f64) -> TickSamples {
        TickSamples {
            thermal: ChannelSample::Reading(evaluate(temp, &ThermalThresholds::default())),
            power: ChannelSample::Reading(evaluate(current, &PowerThresholds::default())),
            neural: ChannelSample::Reading(evaluate(neural, &NeuralSafetyThresholds::default())),
        }
    }

    fn failed(channel: Channel, level: SafetyLevel, failsafe: bool) -> ChannelSample {
        ChannelSample::Failed {
            error: SensorError::NotReady { channel },
            level,
            consecutive_failures: 3,
            failsafe,
            entered_failsafe: false,
        }
    }

    #[test]
    fn test_nominal_readings_stay_normal() {
        let mut sm = SafetyStateMachine::new();
        let t = sm.apply(&samples(25.0, 50.0, 40.0));
        assert_eq!(t.current, SafetyLevel::Normal);
        assert!(!t.changed());
    }

    #[test]
    fn test_aggregate_is_worst_channel() {
        // thermal=Normal, power=Critical, neural=Warning
        let mut sm = SafetyStateMachine::new();
        let t = sm.apply(&samples(25.0, 1200.0, 150.0));
        assert_eq!(t.current, SafetyLevel::Critical);
        assert!(t.escalated());
    }

    #[test]
    fn test_level_falls_freely_below_emergency() {
        let mut sm = SafetyStateMachine::new();
        sm.apply(&samples(56.0, 50.0, 40.0));
        assert_eq!(sm.level(), SafetyLevel::Critical);

        let t = sm.apply(&samples(30.0, 50.0, 40.0));
        assert_eq!(t.previous, SafetyLevel::Critical);
        assert_eq!(t.current, SafetyLevel::Normal);
        assert!(t.changed() && !t.escalated());
    }

    #[test]
    fn test_emergency_latches_once() {
        let mut sm = SafetyStateMachine::new();
        let t = sm.apply(&samples(61.0, 50.0, 40.0));
        assert!(t.entered_emergency());
        assert_eq!(t.trigger, Some(Channel::Thermal));
        let reason = t.shutdown.unwrap();
        assert_eq!(reason.cause, ShutdownCause::ThermalRunaway);
        assert_eq!(reason.reading, Some(61.0));
        assert_eq!(reason.threshold, Some(60.0));

        // Still dangerous: no second shutdown
        let again = sm.apply(&samples(70.0, 50.0, 40.0));
        assert!(!again.entered_emergency());
        assert_eq!(sm.shutdown_count(), 1);
    }

    #[test]
    fn test_emergency_is_sticky_until_reset() {
        let mut sm = SafetyStateMachine::new();
        sm.apply(&samples(61.0, 50.0, 40.0));

        let t = sm.apply(&samples(20.0, 50.0, 40.0));
        assert_eq!(t.current, SafetyLevel::Emergency);
        assert!(!t.changed());

        let reset = sm.reset().unwrap();
        assert_eq!(reset.current, SafetyLevel::Normal);
        assert_eq!(sm.shutdown_count(), 1);

        let t = sm.apply(&samples(46.0, 50.0, 40.0));
        assert_eq!(t.current, SafetyLevel::Warning);
    }

    #[test]
    fn test_reset_outside_emergency_fails() {
        let mut sm = SafetyStateMachine::new();
        assert_eq!(sm.reset(), Err(StateError::NotInEmergency));
        assert_eq!(sm.level(), SafetyLevel::Normal);
    }

    #[test]
    fn test_tie_break_prefers_thermal_then_power() {
        let mut sm = SafetyStateMachine::new();
        let t = sm.apply(&samples(61.0, 2500.0, 1500.0));
        assert_eq!(t.shutdown.unwrap().cause, ShutdownCause::ThermalRunaway);

        let mut sm = SafetyStateMachine::new();
        let t = sm.apply(&samples(20.0, 2500.0, 1500.0));
        assert_eq!(t.shutdown.unwrap().cause, ShutdownCause::PowerSurge);
        assert_eq!(t.trigger, Some(Channel::Power));
    }

    #[test]
    fn test_single_failsafe_channel_is_critical() {
        let mut sm = SafetyStateMachine::new();
        let mut tick = samples(25.0, 50.0, 40.0);
        tick.power = failed(Channel::Power, SafetyLevel::Critical, true);

        let t = sm.apply(&tick);
        assert_eq!(t.current, SafetyLevel::Critical);
        assert!(!t.entered_emergency());
    }

    #[test]
    fn test_blackout_latches_sensor_failure() {
        let mut sm = SafetyStateMachine::new();
        let tick = TickSamples {
            thermal: failed(Channel::Thermal, SafetyLevel::Critical, true),
            power: failed(Channel::Power, SafetyLevel::Critical, true),
            neural: failed(Channel::Neural, SafetyLevel::Critical, true),
        };
        let t = sm.apply(&tick);
        assert_eq!(t.current, SafetyLevel::Emergency);
        assert_eq!(
            t.shutdown.unwrap().cause,
            ShutdownCause::SensorFailureFailSafe
        );
        assert_eq!(t.trigger, None);
    }

    #[test]
    fn test_manual_latch() {
        let mut sm = SafetyStateMachine::new();
        let t = sm.latch(ShutdownReason::new(ShutdownCause::ManualTrigger)).unwrap();
        assert_eq!(t.previous, SafetyLevel::Normal);
        assert!(sm.is_emergency());
        assert!(sm
            .latch(ShutdownReason::new(ShutdownCause::ManualTrigger))
            .is_none());
        assert_eq!(sm.shutdown_count(), 1);
        assert_eq!(
            sm.last_shutdown().map(|r| r.cause.clone()),
            Some(ShutdownCause::ManualTrigger)
        );
    }
}
