//! Shared monitor state
//!
//! Everything mutable lives in [`MonitorState`] behind one mutex. Methods
//! here run with the lock held, so they only evaluate, transition and
//! append. Anything that calls out (callbacks) is returned as a
//! [`Dispatch`] for the caller to run after the lock is released.

use crate::dispatch::{Alert, CallbackRegistry};
use crate::history::ReadingHistory;
use crate::sensor::RawReadings;
use chrono::Utc;
use vigil_core::{
    evaluate, Channel, ChannelHealth, ChannelLevels, ChannelSample, ConfigError, MonitorConfig,
    NewViolation, PerChannel, ProcessGate, ProtectiveAction, SafetyLevel, SafetySnapshot,
    SafetyStateMachine, SensorError, ShutdownCause, ShutdownReason, StateError, TickSamples,
    Transition, ViolationLog, ViolationRecord,
};

/// Outcome of one sampling tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// 1-based tick counter
    pub tick: u64,
    pub previous: SafetyLevel,
    pub level: SafetyLevel,
    pub channel_levels: ChannelLevels,
    /// Set on the tick that entered `Emergency`
    pub shutdown: Option<ShutdownReason>,
    /// Violation records appended by this tick
    pub violations: usize,
    pub sensor_failures: Vec<SensorError>,
}

/// Callback work produced under the lock, run after it is released.
pub(crate) struct Dispatch {
    callbacks: CallbackRegistry,
    shutdown: Option<ShutdownReason>,
    actions: Vec<(ProtectiveAction, Channel)>,
    alerts: Vec<Alert>,
}

impl Dispatch {
    fn new(callbacks: &CallbackRegistry) -> Self {
        Self {
            callbacks: callbacks.clone(),
            shutdown: None,
            actions: Vec::new(),
            alerts: Vec::new(),
        }
    }

    pub(crate) fn has_shutdown(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Shutdown first, then protective actions, then alerts.
    pub(crate) fn run(self) {
        if let Some(reason) = &self.shutdown {
            self.callbacks.dispatch_shutdown(reason);
        }
        if !self.actions.is_empty() {
            self.callbacks.dispatch_actions(&self.actions);
        }
        if !self.alerts.is_empty() {
            self.callbacks.dispatch_alerts(&self.alerts);
        }
    }
}

pub(crate) struct MonitorState {
    config: MonitorConfig,
    machine: SafetyStateMachine,
    thermal_health: ChannelHealth,
    power_health: ChannelHealth,
    neural_health: ChannelHealth,
    log: ViolationLog,
    gate: ProcessGate,
    history: ReadingHistory,
    callbacks: CallbackRegistry,
    last_levels: ChannelLevels,
    ticks: u64,
    /// Emergency entries whose shutdown callbacks have not returned yet
    pending_shutdowns: u32,
}

impl MonitorState {
    /// State for the default configuration. Defaults always validate.
    pub(crate) fn new() -> Result<Self, ConfigError> {
        let config = MonitorConfig::default();
        let gate = ProcessGate::new(&config.processes)?;
        let limit = config.monitor.sensor_failure_limit;
        Ok(Self {
            machine: SafetyStateMachine::new(),
            thermal_health: ChannelHealth::new(Channel::Thermal, limit),
            power_health: ChannelHealth::new(Channel::Power, limit),
            neural_health: ChannelHealth::new(Channel::Neural, limit),
            log: ViolationLog::new(config.monitor.violation_log_capacity),
            gate,
            history: ReadingHistory::new(config.monitor.history_capacity),
            callbacks: CallbackRegistry::default(),
            last_levels: ChannelLevels::default(),
            ticks: 0,
            pending_shutdowns: 0,
            config,
        })
    }

    /// Replace tables and settings. Level, counters, log and callbacks survive.
    pub(crate) fn initialize(&mut self, config: MonitorConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let gate = ProcessGate::new(&config.processes)?;
        let limit = config.monitor.sensor_failure_limit;

        self.gate = gate;
        self.thermal_health = ChannelHealth::new(Channel::Thermal, limit);
        self.power_health = ChannelHealth::new(Channel::Power, limit);
        self.neural_health = ChannelHealth::new(Channel::Neural, limit);
        self.log.set_capacity(config.monitor.violation_log_capacity);
        self.history.set_capacity(config.monitor.history_capacity);
        self.config = config;
        Ok(())
    }

    pub(crate) fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub(crate) fn callbacks_mut(&mut self) -> &mut CallbackRegistry {
        &mut self.callbacks
    }

    fn health(&self, channel: Channel) -> &ChannelHealth {
        match channel {
            Channel::Thermal => &self.thermal_health,
            Channel::Power => &self.power_health,
            Channel::Neural => &self.neural_health,
        }
    }

    fn health_mut(&mut self, channel: Channel) -> &mut ChannelHealth {
        match channel {
            Channel::Thermal => &mut self.thermal_health,
            Channel::Power => &mut self.power_health,
            Channel::Neural => &mut self.neural_health,
        }
    }

    // ========================================================================
    // Sampling
    // ========================================================================

    fn observe(&mut self, channel: Channel, raw: Result<f64, SensorError>) -> ChannelSample {
        let evaluated = raw.map(|reading| match channel {
            Channel::Thermal => evaluate(reading, &self.config.thermal),
            Channel::Power => evaluate(reading, &self.config.power),
            Channel::Neural => evaluate(reading, &self.config.neural),
        });
        if let Ok(eval) = &evaluated {
            self.history.push(channel, eval.reading);
        }
        self.health_mut(channel).observe(evaluated)
    }

    /// Evaluate one tick of raw readings and apply the transition.
    pub(crate) fn process_tick(&mut self, raw: RawReadings) -> (TickReport, Dispatch) {
        self.ticks += 1;
        let mut dispatch = Dispatch::new(&self.callbacks);
        let mut records: Vec<NewViolation> = Vec::new();
        let mut sensor_failures = Vec::new();

        let samples = TickSamples {
            thermal: self.observe(Channel::Thermal, raw.thermal),
            power: self.observe(Channel::Power, raw.power),
            neural: self.observe(Channel::Neural, raw.neural),
        };

        for (channel, sample) in samples.iter() {
            if let ChannelSample::Failed {
                error,
                level,
                consecutive_failures,
                entered_failsafe,
                ..
            } = sample
            {
                tracing::warn!(
                    "Sensor failure on {} channel ({} consecutive): {}",
                    channel,
                    consecutive_failures,
                    error
                );
                if *entered_failsafe {
                    tracing::error!(
                        "{} channel forced to {} after {} consecutive sensor failures",
                        channel,
                        level,
                        consecutive_failures
                    );
                    records.push(NewViolation::sensor_failure(
                        channel,
                        *consecutive_failures,
                        *level,
                    ));
                }
                sensor_failures.push(error.clone());
            }
        }

        let levels = samples.levels();
        let transition = self.machine.apply(&samples);

        for (channel, sample) in samples.iter() {
            let Some(eval) = sample.evaluation() else {
                continue;
            };
            if let Some(action) = eval.action {
                dispatch.actions.push((action, channel));
            }
            let Some(detail) = &eval.violation else {
                continue;
            };
            let is_trigger = transition.trigger == Some(channel);
            if is_trigger || eval.level > self.last_levels.get(channel) {
                let record = NewViolation::threshold(detail, eval.level);
                records.push(if is_trigger {
                    record.triggering_emergency()
                } else {
                    record
                });
            }
        }

        if transition.entered_emergency() && !records.iter().any(|r| r.triggered_emergency) {
            // Emergency without a fresh reading behind it: a held level or a blackout
            let record = match transition.trigger {
                Some(channel) => NewViolation::sensor_failure(
                    channel,
                    self.health(channel).consecutive_failures(),
                    SafetyLevel::Emergency,
                ),
                None => NewViolation::sensor_blackout(self.config.monitor.sensor_failure_limit),
            };
            records.push(record.triggering_emergency());
        }

        let violations = records.len();
        for record in records {
            dispatch.alerts.push(Alert::new(record.level, record.message.clone()));
            self.log.append(record);
        }

        self.note_transition(&transition, &mut dispatch);
        self.last_levels = levels;

        let report = TickReport {
            tick: self.ticks,
            previous: transition.previous,
            level: transition.current,
            channel_levels: levels,
            shutdown: transition.shutdown,
            violations,
            sensor_failures,
        };
        (report, dispatch)
    }

    /// Log a transition and queue its alert and shutdown work.
    fn note_transition(&mut self, transition: &Transition, dispatch: &mut Dispatch) {
        if let Some(reason) = &transition.shutdown {
            tracing::error!(
                "Safety level {} -> EMERGENCY: {}",
                transition.previous,
                reason
            );
            self.pending_shutdowns += 1;
            dispatch.shutdown = Some(reason.clone());
        } else if transition.escalated() {
            tracing::warn!(
                "Safety level raised: {} -> {}",
                transition.previous,
                transition.current
            );
        } else if transition.changed() {
            tracing::info!(
                "Safety level lowered: {} -> {}",
                transition.previous,
                transition.current
            );
        }

        if transition.changed() {
            dispatch.alerts.push(Alert::new(
                transition.current,
                format!(
                    "safety level changed from {} to {}",
                    transition.previous, transition.current
                ),
            ));
        }
    }

    /// Called once the shutdown callbacks of an emergency entry returned.
    pub(crate) fn finish_shutdown(&mut self) {
        self.pending_shutdowns = self.pending_shutdowns.saturating_sub(1);
    }

    // ========================================================================
    // Out-of-band operations
    // ========================================================================

    /// Returns `None` when the process may run.
    pub(crate) fn check_process(&mut self, name: &str) -> Option<Dispatch> {
        let matched = self.gate.check(name)?;
        tracing::warn!(
            "Blocked restricted process '{}' (rule '{}')",
            name,
            matched.rule()
        );
        let record = NewViolation::process(name, matched.rule(), SafetyLevel::Critical);
        let mut dispatch = Dispatch::new(&self.callbacks);
        dispatch
            .alerts
            .push(Alert::new(record.level, record.message.clone()));
        self.log.append(record);
        Some(dispatch)
    }

    pub(crate) fn add_restricted_process(&mut self, name: &str) {
        self.gate.add_process(name);
        self.config
            .processes
            .restricted_processes
            .insert(name.to_string());
    }

    pub(crate) fn add_restricted_pattern(&mut self, pattern: &str) -> Result<(), ConfigError> {
        self.gate.add_pattern(pattern)?;
        self.config
            .processes
            .restricted_patterns
            .insert(pattern.to_string());
        Ok(())
    }

    /// Latch `Emergency` with a caller-supplied cause. `None` if already latched.
    pub(crate) fn latch(&mut self, cause: ShutdownCause) -> Option<Dispatch> {
        let transition = self.machine.latch(ShutdownReason::new(cause.clone()))?;
        let mut dispatch = Dispatch::new(&self.callbacks);

        if let ShutdownCause::ProcessViolation { process } = &cause {
            let record = NewViolation::process(process, process, SafetyLevel::Emergency)
                .triggering_emergency();
            dispatch
                .alerts
                .push(Alert::new(record.level, record.message.clone()));
            self.log.append(record);
        }

        self.note_transition(&transition, &mut dispatch);
        Some(dispatch)
    }

    pub(crate) fn reset(&mut self) -> Result<Dispatch, StateError> {
        let transition = self.machine.reset()?;
        tracing::info!(
            "Emergency latch cleared by reset ({} shutdowns so far)",
            self.machine.shutdown_count()
        );
        let mut dispatch = Dispatch::new(&self.callbacks);
        self.note_transition(&transition, &mut dispatch);
        Ok(dispatch)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub(crate) fn violations(&self, limit: Option<usize>) -> Vec<ViolationRecord> {
        self.log.recent(limit)
    }

    pub(crate) fn snapshot(&self, is_active: bool) -> SafetySnapshot {
        let latched = self.machine.is_emergency();
        let in_progress = latched && self.pending_shutdowns > 0;
        SafetySnapshot {
            level: self.machine.level(),
            is_active,
            is_emergency: latched && !in_progress,
            shutdown_in_progress: in_progress,
            last_readings: PerChannel::from_fn(|c| self.health(c).last_reading()),
            average_readings: self.history.averages(),
            consecutive_failures: PerChannel::from_fn(|c| self.health(c).consecutive_failures()),
            shutdown_count: self.machine.shutdown_count(),
            violation_count: self.log.total_recorded(),
            last_shutdown: self.machine.last_shutdown().cloned(),
            ticks: self.ticks,
            captured_at: Utc::now(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
