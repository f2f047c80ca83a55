//! Safety levels and monitored channels

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete escalation stage summarizing aggregate risk.
///
/// Ordering is meaningful: `Normal < Warning < Throttling < Critical < Emergency`.
/// Aggregation across channels always takes the maximum.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    #[default]
    Normal,
    Warning,
    Throttling,
    Critical,
    /// Terminal until an explicit reset
    Emergency,
}

impl SafetyLevel {
    pub const ALL: [SafetyLevel; 5] = [
        SafetyLevel::Normal,
        SafetyLevel::Warning,
        SafetyLevel::Throttling,
        SafetyLevel::Critical,
        SafetyLevel::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyLevel::Normal => "normal",
            SafetyLevel::Warning => "warning",
            SafetyLevel::Throttling => "throttling",
            SafetyLevel::Critical => "critical",
            SafetyLevel::Emergency => "emergency",
        }
    }

    pub fn is_emergency(self) -> bool {
        self == SafetyLevel::Emergency
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One monitored physical signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Thermal,
    Power,
    Neural,
}

impl Channel {
    /// All channels in emergency tie-break priority order.
    pub const ALL: [Channel; 3] = [Channel::Thermal, Channel::Power, Channel::Neural];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Thermal => "thermal",
            Channel::Power => "power",
            Channel::Neural => "neural",
        }
    }

    /// Unit of the raw reading on this channel
    pub fn unit(&self) -> &'static str {
        match self {
            Channel::Thermal => "°C",
            Channel::Power => "mA",
            Channel::Neural => "µV",
        }
    }

    /// Human name of the measured quantity
    pub fn quantity(&self) -> &'static str {
        match self {
            Channel::Thermal => "temperature",
            Channel::Power => "current",
            Channel::Neural => "neural activity",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_totally_ordered() {
        for pair in SafetyLevel::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{} should be below {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_max_picks_most_severe() {
        let worst = [SafetyLevel::Warning, SafetyLevel::Critical, SafetyLevel::Normal]
            .into_iter()
            .max()
            .unwrap();
        assert_eq!(worst, SafetyLevel::Critical);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&SafetyLevel::Throttling).unwrap();
        assert_eq!(json, "\"throttling\"");
        let parsed: Channel = serde_json::from_str("\"neural\"").unwrap();
        assert_eq!(parsed, Channel::Neural);
    }
}
