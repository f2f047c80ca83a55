use crate::error::ConfigError;
use crate::failsafe::DEFAULT_FAILURE_LIMIT;
use crate::process::ProcessGate;
use crate::thresholds::{
    NeuralSafetyThresholds, PowerThresholds, ProcessRestrictions, ThermalThresholds,
};
use crate::violation::DEFAULT_LOG_CAPACITY;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub thermal: ThermalThresholds,
    pub power: PowerThresholds,
    pub neural: NeuralSafetyThresholds,
    pub processes: ProcessRestrictions,
    pub monitor: MonitorSettings,
}

impl MonitorConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied. Validation is left to
    /// `initialize`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: MonitorConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file is missing or invalid, use defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({:#}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(n) = env_number("VIGIL_MONITORING_INTERVAL_MS") {
            self.monitor.monitoring_interval_ms = n;
        }
        if let Some(n) = env_number("VIGIL_SENSOR_TIMEOUT_MS") {
            self.monitor.sensor_timeout_ms = n;
        }
        if let Some(n) = env_number("VIGIL_VIOLATION_LOG_CAPACITY") {
            self.monitor.violation_log_capacity = n;
        }
    }

    /// Check every table and setting. The first problem found is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thermal.validate()?;
        self.power.validate()?;
        self.neural.validate()?;
        self.monitor.validate()?;
        // Compiling the gate is the pattern check
        ProcessGate::new(&self.processes)?;
        Ok(())
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Sampling period (default 100 ms = 10 Hz)
    pub monitoring_interval_ms: u64,
    /// Per-channel read timeout; expiry counts as a sensor failure
    pub sensor_timeout_ms: u64,
    /// Consecutive failures before a channel is forced to `Critical`
    pub sensor_failure_limit: u32,
    pub violation_log_capacity: usize,
    /// Readings kept per channel for averages
    pub history_capacity: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            monitoring_interval_ms: 100,
            sensor_timeout_ms: 50,
            sensor_failure_limit: DEFAULT_FAILURE_LIMIT,
            violation_log_capacity: DEFAULT_LOG_CAPACITY,
            history_capacity: 1000,
        }
    }
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("monitor.monitoring_interval_ms", self.monitoring_interval_ms == 0),
            ("monitor.sensor_timeout_ms", self.sensor_timeout_ms == 0),
            ("monitor.sensor_failure_limit", self.sensor_failure_limit == 0),
            ("monitor.violation_log_capacity", self.violation_log_capacity == 0),
            ("monitor.history_capacity", self.history_capacity == 0),
        ];
        match checks.iter().find(|(_, is_zero)| *is_zero) {
            Some(&(field, _)) => Err(ConfigError::Zero { field }),
            None => Ok(()),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.monitoring_interval_ms)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = MonitorConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.monitor.interval(), Duration::from_millis(100));
        assert_eq!(cfg.monitor.sensor_failure_limit, 3);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[thermal]
emergency_threshold = 58.0
"#;
        let cfg: MonitorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.thermal.emergency_threshold, 58.0);
        // Defaults for unspecified fields
        assert_eq!(cfg.thermal.warning_threshold, 45.0);
        assert_eq!(cfg.power.max_current_ma, 2000.0);
        assert!(cfg.processes.restricted_processes.contains("cpu-burn"));
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[thermal]
warning_threshold = 40.0
throttling_threshold = 45.0
critical_threshold = 50.0
emergency_threshold = 55.0
max_allowed = 58.0

[power]
normal_current_ma = 50.0
warning_current_ma = 300.0
critical_current_ma = 800.0
max_current_ma = 1500.0
current_limit_ma = 1200.0

[neural]
normal_eeg_uv = 80.0
seizure_threshold_uv = 400.0
critical_threshold_uv = 900.0
sampling_rate_hz = 512

[processes]
restricted_processes = ["cpu-burn"]
restricted_patterns = ["miner"]

[monitor]
monitoring_interval_ms = 50
sensor_timeout_ms = 20
sensor_failure_limit = 5
violation_log_capacity = 64
history_capacity = 200
"#;
        let cfg: MonitorConfig = toml::from_str(toml_str).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.thermal.max_allowed, 58.0);
        assert_eq!(cfg.power.current_limit_ma, 1200.0);
        assert_eq!(cfg.neural.sampling_rate_hz, 512);
        assert_eq!(cfg.processes.restricted_processes.len(), 1);
        assert!(cfg.processes.restricted_patterns.contains("miner"));
        assert_eq!(cfg.monitor.sensor_timeout(), Duration::from_millis(20));
        assert_eq!(cfg.monitor.violation_log_capacity, 64);
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let toml_str = r#"
[thermal]
warning_threshold = 57.0
critical_threshold = 55.0
"#;
        let cfg: MonitorConfig = toml::from_str(toml_str).unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Misordered { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_interval_and_bad_pattern() {
        let mut cfg = MonitorConfig::default();
        cfg.monitor.monitoring_interval_ms = 0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Zero {
                field: "monitor.monitoring_interval_ms"
            })
        );

        let mut cfg = MonitorConfig::default();
        cfg.processes.restricted_patterns.insert("**".to_string());
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_env_overrides_and_defaults() {
        std::env::set_var("VIGIL_MONITORING_INTERVAL_MS", "250");
        std::env::set_var("VIGIL_SENSOR_TIMEOUT_MS", "not-a-number");

        let mut cfg = MonitorConfig::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.monitor.monitoring_interval_ms, 250);
        // Unparseable values are ignored
        assert_eq!(cfg.monitor.sensor_timeout_ms, 50);

        std::env::remove_var("VIGIL_MONITORING_INTERVAL_MS");
        std::env::remove_var("VIGIL_SENSOR_TIMEOUT_MS");

        let cfg = MonitorConfig::load_or_default("/nonexistent/vigil.toml");
        assert_eq!(cfg.monitor.monitoring_interval_ms, 100);
    }
}
