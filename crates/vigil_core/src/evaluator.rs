//! Threshold Evaluator
//!
//! Maps a single reading against a threshold table to a [`SafetyLevel`],
//! an optional violation and an optional protective action. Evaluation is
//! pure: nothing here logs, allocates callbacks or touches shared state.
//!
//! Every comparison is `>=`: a reading exactly on a boundary has crossed it.

use crate::level::{Channel, SafetyLevel};
use crate::thresholds::{NeuralSafetyThresholds, PowerThresholds, ThermalThresholds};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side action recommended alongside a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectiveAction {
    /// Reduce compute load to shed heat
    Throttle,
    /// Engage current limiting ahead of the hard cutoff
    LimitCurrent,
    /// Isolate the neural interface
    DisconnectNeural,
}

impl fmt::Display for ProtectiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtectiveAction::Throttle => "throttle",
            ProtectiveAction::LimitCurrent => "limit_current",
            ProtectiveAction::DisconnectNeural => "disconnect_neural",
        };
        f.write_str(name)
    }
}

/// A boundary crossed by a reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationDetail {
    pub channel: Channel,
    pub value: f64,
    pub threshold: f64,
    /// Name of the boundary, e.g. `"emergency"` or `"current_limit"`
    pub boundary: &'static str,
}

impl ViolationDetail {
    pub fn describe(&self) -> String {
        format!(
            "{} {:.1}{} reached {} threshold {:.1}{}",
            self.channel.quantity(),
            self.value,
            self.channel.unit(),
            self.boundary,
            self.threshold,
            self.channel.unit()
        )
    }
}

/// Outcome of evaluating one reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub channel: Channel,
    pub reading: f64,
    pub level: SafetyLevel,
    /// Present when the level is `Throttling` or above
    pub violation: Option<ViolationDetail>,
    pub action: Option<ProtectiveAction>,
}

/// A table that can classify readings of one channel.
pub trait ThresholdTable {
    const CHANNEL: Channel;

    fn evaluate(&self, reading: f64) -> Evaluation;
}

/// `evaluate(reading, table) -> (level, violation)`; see [`Evaluation`].
pub fn evaluate<T: ThresholdTable>(reading: f64, table: &T) -> Evaluation {
    table.evaluate(reading)
}

impl ThresholdTable for ThermalThresholds {
    const CHANNEL: Channel = Channel::Thermal;

    fn evaluate(&self, reading: f64) -> Evaluation {
        let ladder = [
            (SafetyLevel::Emergency, self.emergency_threshold, "emergency"),
            (SafetyLevel::Critical, self.critical_threshold, "critical"),
            (SafetyLevel::Throttling, self.throttling_threshold, "throttling"),
            (SafetyLevel::Warning, self.warning_threshold, "warning"),
        ];
        let (level, crossed) = climb(reading, &ladder);
        let action = (level >= SafetyLevel::Throttling).then_some(ProtectiveAction::Throttle);
        build(Self::CHANNEL, reading, level, crossed, action)
    }
}

impl ThresholdTable for PowerThresholds {
    const CHANNEL: Channel = Channel::Power;

    fn evaluate(&self, reading: f64) -> Evaluation {
        let ladder = [
            (SafetyLevel::Emergency, self.max_current_ma, "max_current"),
            (SafetyLevel::Critical, self.critical_current_ma, "critical"),
            (SafetyLevel::Warning, self.warning_current_ma, "warning"),
        ];
        let (mut level, mut crossed) = climb(reading, &ladder);

        // Soft cap: pre-emptive throttling below the hard cutoff
        let over_limit = reading >= self.current_limit_ma;
        if over_limit && level < SafetyLevel::Throttling {
            level = SafetyLevel::Throttling;
            crossed = Some((self.current_limit_ma, "current_limit"));
        }

        let action = (over_limit || level >= SafetyLevel::Critical)
            .then_some(ProtectiveAction::LimitCurrent);
        build(Self::CHANNEL, reading, level, crossed, action)
    }
}

impl ThresholdTable for NeuralSafetyThresholds {
    const CHANNEL: Channel = Channel::Neural;

    fn evaluate(&self, reading: f64) -> Evaluation {
        let ladder = [
            (SafetyLevel::Emergency, self.critical_threshold_uv, "critical"),
            (SafetyLevel::Critical, self.seizure_threshold_uv, "seizure"),
            (SafetyLevel::Warning, self.normal_eeg_uv, "normal_eeg"),
        ];
        let (level, crossed) = climb(reading, &ladder);
        let action =
            (level >= SafetyLevel::Critical).then_some(ProtectiveAction::DisconnectNeural);
        build(Self::CHANNEL, reading, level, crossed, action)
    }
}

/// Walk a descending ladder and return the first boundary the reading meets.
fn climb(
    reading: f64,
    ladder: &[(SafetyLevel, f64, &'static str)],
) -> (SafetyLevel, Option<(f64, &'static str)>) {
    ladder
        .iter()
        .find(|(_, threshold, _)| reading >= *threshold)
        .map(|&(level, threshold, name)| (level, Some((threshold, name))))
        .unwrap_or((SafetyLevel::Normal, None))
}

fn build(
    channel: Channel,
    reading: f64,
    level: SafetyLevel,
    crossed: Option<(f64, &'static str)>,
    action: Option<ProtectiveAction>,
) -> Evaluation {
    let violation = crossed
        .filter(|_| level >= SafetyLevel::Throttling)
        .map(|(threshold, boundary)| ViolationDetail {
            channel,
            value: reading,
            threshold,
            boundary,
        });

    Evaluation {
        channel,
        reading,
        level,
        violation,
        action,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thermal_ladder() {
        let t = ThermalThresholds::default();
        assert_eq!(evaluate(20.0, &t).level, SafetyLevel::Normal);
        assert_eq!(evaluate(46.0, &t).level, SafetyLevel::Warning);
        assert_eq!(evaluate(51.0, &t).level, SafetyLevel::Throttling);
        assert_eq!(evaluate(56.0, &t).level, SafetyLevel::Critical);
        assert_eq!(evaluate(75.0, &t).level, SafetyLevel::Emergency);
    }

    #[test]
    fn test_exact_boundary_counts_as_crossed() {
        let t = ThermalThresholds::default();
        assert_eq!(evaluate(45.0, &t).level, SafetyLevel::Warning);
        assert_eq!(evaluate(60.0, &t).level, SafetyLevel::Emergency);

        let p = PowerThresholds::default();
        assert_eq!(evaluate(2000.0, &p).level, SafetyLevel::Emergency);

        let n = NeuralSafetyThresholds::default();
        assert_eq!(evaluate(500.0, &n).level, SafetyLevel::Critical);
        assert_eq!(evaluate(1000.0, &n).level, SafetyLevel::Emergency);
    }

    #[test]
    fn test_warning_is_not_a_violation() {
        let eval = evaluate(46.0, &ThermalThresholds::default());
        assert!(eval.violation.is_none());
        assert!(eval.action.is_none());
    }

    #[test]
    fn test_thermal_violation_detail() {
        let eval = evaluate(61.5, &ThermalThresholds::default());
        let v = eval.violation.unwrap();
        assert_eq!(v.channel, Channel::Thermal);
        assert_eq!(v.threshold, 60.0);
        assert_eq!(v.boundary, "emergency");
        assert_eq!(eval.action, Some(ProtectiveAction::Throttle));
        assert!(v.describe().contains("temperature 61.5°C"));
    }

    #[test]
    fn test_power_current_limit_below_critical() {
        // Soft cap configured below the critical boundary
        let p = PowerThresholds {
            current_limit_ma: 800.0,
            ..Default::default()
        };
        let eval = evaluate(850.0, &p);
        assert_eq!(eval.level, SafetyLevel::Throttling);
        assert_eq!(eval.action, Some(ProtectiveAction::LimitCurrent));
        assert_eq!(eval.violation.unwrap().boundary, "current_limit");
    }

    #[test]
    fn test_power_default_ladder() {
        let p = PowerThresholds::default();
        assert_eq!(evaluate(50.0, &p).level, SafetyLevel::Normal);
        assert_eq!(evaluate(150.0, &p).level, SafetyLevel::Normal);
        assert_eq!(evaluate(600.0, &p).level, SafetyLevel::Warning);

        let critical = evaluate(1600.0, &p);
        assert_eq!(critical.level, SafetyLevel::Critical);
        assert_eq!(critical.action, Some(ProtectiveAction::LimitCurrent));
        assert_eq!(critical.violation.unwrap().boundary, "critical");
    }

    #[test]
    fn test_neural_ladder() {
        let n = NeuralSafetyThresholds::default();
        assert_eq!(evaluate(50.0, &n).level, SafetyLevel::Normal);
        assert_eq!(evaluate(150.0, &n).level, SafetyLevel::Warning);

        let seizure = evaluate(600.0, &n);
        assert_eq!(seizure.level, SafetyLevel::Critical);
        assert_eq!(seizure.action, Some(ProtectiveAction::DisconnectNeural));
        assert_eq!(seizure.violation.unwrap().boundary, "seizure");
    }
}
