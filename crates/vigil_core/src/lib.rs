//! # Vigil Core
//!
//! Runtime-free building blocks of the Vigil fail-safe safety monitor:
//!
//! - **Threshold tables**: ordered boundaries for the thermal, power and
//!   neural channels plus the process restriction table
//! - **Evaluator**: reading × table → level, violation, protective action
//! - **Fail-safe tracking**: dead sensors degrade toward danger, not silence
//! - **State machine**: worst-channel aggregation with a one-way emergency latch
//! - **Violation log**: bounded audit trail that never loses the latest
//!   emergency record
//! - **Process gate**: exact-name and pattern restrictions
//!
//! Nothing here spawns tasks or blocks; `vigil_monitor` drives it.

pub mod config;
pub mod error;
pub mod evaluator;
pub mod failsafe;
pub mod level;
pub mod process;
pub mod reason;
pub mod snapshot;
pub mod state_machine;
pub mod thresholds;
pub mod violation;

pub use config::{MonitorConfig, MonitorSettings};
pub use error::{ConfigError, LifecycleError, SensorError, StateError};
pub use evaluator::{evaluate, Evaluation, ProtectiveAction, ThresholdTable, ViolationDetail};
pub use failsafe::{ChannelHealth, ChannelSample, DEFAULT_FAILURE_LIMIT};
pub use level::{Channel, SafetyLevel};
pub use process::{ProcessGate, RestrictionMatch};
pub use reason::{ShutdownCause, ShutdownReason};
pub use snapshot::{PerChannel, SafetySnapshot};
pub use state_machine::{ChannelLevels, SafetyStateMachine, TickSamples, Transition};
pub use thresholds::{
    NeuralSafetyThresholds, PowerThresholds, ProcessRestrictions, ThermalThresholds,
};
pub use violation::{
    NewViolation, Observation, ViolationCategory, ViolationLog, ViolationRecord,
    DEFAULT_LOG_CAPACITY,
};
