//! # Vigil Monitor
//!
//! Runtime half of the Vigil safety monitor. Owns the periodic sampling task,
//! the sensor collaborator boundary and the callback registries, and drives
//! the pure logic in `vigil_core` once per tick.
//!
//! ```text
//! SensorReader ──reads (outside lock)──▶ MonitorState ──Dispatch──▶ callbacks
//!                                          (one mutex)   (outside lock)
//! ```

pub mod dispatch;
pub mod history;
pub mod monitor;
pub mod sensor;
pub mod state;

pub use dispatch::{ActionCallback, Alert, AlertCallback, CallbackRegistry, ShutdownCallback};
pub use history::ReadingHistory;
pub use monitor::{LifecycleState, SafetyMonitor};
pub use sensor::{RawReadings, SensorReader};
pub use state::TickReport;
