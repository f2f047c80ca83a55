//! Safety Monitor
//!
//! The owned monitor instance handed to the orchestration layer. It holds:
//! - the sensor collaborator
//! - all shared state behind a single mutex
//! - the periodic sampling task and its stop signal
//! - a lifecycle watch channel (`Uninitialized → Initialized → Running → Stopped`)
//!
//! Sensor reads and callback dispatch both happen outside the state lock.

use crate::sensor::{self, SensorReader};
use crate::state::{MonitorState, TickReport};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use vigil_core::{
    Channel, ConfigError, LifecycleError, MonitorConfig, ProtectiveAction, SafetyLevel,
    SafetySnapshot, ShutdownCause, ShutdownReason, StateError, ViolationRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

struct SamplingTask {
    handle: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

struct Inner {
    sensors: Arc<dyn SensorReader>,
    state: Mutex<MonitorState>,
    /// Lock order: `task` before `state`
    task: Mutex<Option<SamplingTask>>,
    lifecycle_tx: watch::Sender<LifecycleState>,
}

/// Cheap to clone; clones share one monitor.
#[derive(Clone)]
pub struct SafetyMonitor {
    inner: Arc<Inner>,
}

impl SafetyMonitor {
    pub fn new(sensors: Arc<dyn SensorReader>) -> Result<Self, ConfigError> {
        let (lifecycle_tx, _) = watch::channel(LifecycleState::Uninitialized);
        Ok(Self {
            inner: Arc::new(Inner {
                sensors,
                state: Mutex::new(MonitorState::new()?),
                task: Mutex::new(None),
                lifecycle_tx,
            }),
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Validate and install thresholds. Nothing is applied if validation fails.
    pub async fn initialize(&self, config: MonitorConfig) -> Result<(), ConfigError> {
        let _task = self.inner.task.lock().await;
        if self.lifecycle_state() == LifecycleState::Running {
            return Err(ConfigError::MonitorRunning);
        }

        let interval = config.monitor.interval();
        if let Err(e) = self.inner.state.lock().await.initialize(config) {
            tracing::error!("Safety monitor configuration rejected: {}", e);
            return Err(e);
        }

        self.inner
            .lifecycle_tx
            .send_replace(LifecycleState::Initialized);
        tracing::info!("Safety monitor initialized (interval {:?})", interval);
        Ok(())
    }

    /// Begin periodic sampling.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        let mut slot = self.inner.task.lock().await;
        match self.lifecycle_state() {
            LifecycleState::Uninitialized => return Err(LifecycleError::NotInitialized),
            LifecycleState::Running => return Err(LifecycleError::AlreadyRunning),
            LifecycleState::Initialized | LifecycleState::Stopped => {}
        }

        let interval = self.inner.state.lock().await.config().monitor.interval();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(sampling_loop(
            Arc::downgrade(&self.inner),
            interval,
            stop_rx,
        ));

        *slot = Some(SamplingTask { handle, stop_tx });
        self.inner.lifecycle_tx.send_replace(LifecycleState::Running);
        tracing::info!("Safety monitoring started ({:?} per tick)", interval);
        Ok(())
    }

    /// Stop sampling after the in-flight tick, if any. Idempotent once started.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let mut slot = self.inner.task.lock().await;
        match self.lifecycle_state() {
            LifecycleState::Uninitialized | LifecycleState::Initialized => {
                return Err(LifecycleError::NotStarted)
            }
            LifecycleState::Stopped => return Ok(()),
            LifecycleState::Running => {}
        }

        let result = match slot.take() {
            Some(task) => {
                let _ = task.stop_tx.send(true);
                task.handle.await
            }
            None => Ok(()),
        };
        self.inner.lifecycle_tx.send_replace(LifecycleState::Stopped);

        match result {
            Ok(()) => {
                tracing::info!("Safety monitoring stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Sampling task ended abnormally: {}", e);
                Err(LifecycleError::TaskFailed(e.to_string()))
            }
        }
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        *self.inner.lifecycle_tx.borrow()
    }

    pub fn subscribe_lifecycle(&self) -> watch::Receiver<LifecycleState> {
        self.inner.lifecycle_tx.subscribe()
    }

    // ========================================================================
    // Sampling
    // ========================================================================

    /// Run exactly one tick: read, evaluate, transition, dispatch.
    ///
    /// Returns only after every shutdown callback triggered by this tick has
    /// returned.
    pub async fn sample_once(&self) -> TickReport {
        let timeout = self.inner.state.lock().await.config().monitor.sensor_timeout();
        let raw = sensor::read_all(&self.inner.sensors, timeout).await;

        let (report, dispatch) = self.inner.state.lock().await.process_tick(raw);
        let shutdown = dispatch.has_shutdown();
        dispatch.run();
        if shutdown {
            self.inner.state.lock().await.finish_shutdown();
        }

        tracing::trace!(
            "Tick {} complete: level={} ({} violations)",
            report.tick,
            report.level,
            report.violations
        );
        report
    }

    // ========================================================================
    // Operations callable from any task
    // ========================================================================

    /// `false` if `name` matches a restriction. Blocked checks are always logged.
    pub async fn check_process_authorization(&self, name: &str) -> bool {
        let dispatch = self.inner.state.lock().await.check_process(name);
        match dispatch {
            Some(dispatch) => {
                dispatch.run();
                false
            }
            None => true,
        }
    }

    pub async fn add_restricted_process(&self, name: &str) {
        self.inner.state.lock().await.add_restricted_process(name);
        tracing::info!("Added restricted process '{}'", name);
    }

    pub async fn add_restricted_pattern(&self, pattern: &str) -> Result<(), ConfigError> {
        self.inner.state.lock().await.add_restricted_pattern(pattern)?;
        tracing::info!("Added restricted pattern '{}'", pattern);
        Ok(())
    }

    /// Latch `Emergency` out-of-band. Returns `false` if already latched.
    pub async fn trigger_emergency_shutdown(&self, cause: ShutdownCause) -> bool {
        let dispatch = self.inner.state.lock().await.latch(cause);
        let Some(dispatch) = dispatch else {
            tracing::debug!("Emergency already latched, trigger ignored");
            return false;
        };
        dispatch.run();
        self.inner.state.lock().await.finish_shutdown();
        true
    }

    /// Clear the emergency latch.
    pub async fn reset(&self) -> Result<(), StateError> {
        if self.lifecycle_state() == LifecycleState::Uninitialized {
            return Err(StateError::NotInitialized);
        }
        let dispatch = self.inner.state.lock().await.reset()?;
        dispatch.run();
        Ok(())
    }

    pub async fn get_metrics(&self) -> SafetySnapshot {
        let is_active = {
            let slot = self.inner.task.lock().await;
            slot.as_ref().is_some_and(|task| !task.handle.is_finished())
        };
        self.inner.state.lock().await.snapshot(is_active)
    }

    /// Newest last.
    pub async fn get_violation_log(&self, limit: Option<usize>) -> Vec<ViolationRecord> {
        self.inner.state.lock().await.violations(limit)
    }

    pub async fn config(&self) -> MonitorConfig {
        self.inner.state.lock().await.config().clone()
    }

    // ========================================================================
    // Callback registration
    // ========================================================================

    /// Callbacks run synchronously on the sampling task before the tick
    /// completes. They must not block; hand slow work off to a task.
    pub async fn on_emergency_shutdown<F>(&self, callback: F)
    where
        F: Fn(&ShutdownReason) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock().await;
        state.callbacks_mut().add_shutdown(Arc::new(callback));
    }

    pub async fn on_safety_alert<F>(&self, callback: F)
    where
        F: Fn(SafetyLevel, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock().await;
        state.callbacks_mut().add_alert(Arc::new(callback));
    }

    pub async fn on_protective_action<F>(&self, callback: F)
    where
        F: Fn(ProtectiveAction, Channel) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock().await;
        state.callbacks_mut().add_action(Arc::new(callback));
    }
}

/// Fixed-rate sampling until the stop signal fires or the monitor is dropped.
async fn sampling_loop(inner: Weak<Inner>, period: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = stop_rx.changed() => break,

            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let monitor = SafetyMonitor { inner };
                let tick = {
                    let monitor = monitor.clone();
                    async move { monitor.sample_once().await }
                };
                run_guarded(&monitor, tick).await;
            }
        }
    }

    tracing::debug!("Sampling loop exited");
}

/// Run one tick in its own task. A panicking tick latches `Emergency`
/// and the loop carries on.
async fn run_guarded<F>(monitor: &SafetyMonitor, tick: F)
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match tokio::spawn(tick).await {
        Ok(_) => {}
        Err(e) if e.is_panic() => {
            tracing::error!("Sampling tick panicked, failing safe: {}", e);
            monitor
                .trigger_emergency_shutdown(ShutdownCause::SystemFailure)
                .await;
        }
        Err(e) => tracing::warn!("Sampling tick cancelled: {}", e),
    }
}

// ============================================================================
// Tests
// ============================================================================
