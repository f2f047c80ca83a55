//! Callback registries for alerts, protective actions and emergency shutdown
//!
//! Every callback is invoked in registration order. A callback that returns
//! an error or panics is logged and skipped; the remaining callbacks still
//! run. Dispatch never happens while the monitor state lock is held.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use vigil_core::{Channel, ProtectiveAction, SafetyLevel, ShutdownReason};

pub type ShutdownCallback = Arc<dyn Fn(&ShutdownReason) -> anyhow::Result<()> + Send + Sync>;
pub type AlertCallback = Arc<dyn Fn(SafetyLevel, &str) -> anyhow::Result<()> + Send + Sync>;
pub type ActionCallback =
    Arc<dyn Fn(ProtectiveAction, Channel) -> anyhow::Result<()> + Send + Sync>;

/// A message for the alert callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub level: SafetyLevel,
    pub message: String,
}

impl Alert {
    pub fn new(level: SafetyLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Registered callbacks. Cloning copies the `Arc`s, not the closures.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    shutdown: Vec<ShutdownCallback>,
    alert: Vec<AlertCallback>,
    action: Vec<ActionCallback>,
}

impl CallbackRegistry {
    pub fn add_shutdown(&mut self, callback: ShutdownCallback) {
        self.shutdown.push(callback);
    }

    pub fn add_alert(&mut self, callback: AlertCallback) {
        self.alert.push(callback);
    }

    pub fn add_action(&mut self, callback: ActionCallback) {
        self.action.push(callback);
    }

    /// Run every shutdown callback once. Returns how many failed.
    pub fn dispatch_shutdown(&self, reason: &ShutdownReason) -> usize {
        tracing::error!(
            "EMERGENCY SHUTDOWN TRIGGERED: {} ({} callbacks)",
            reason,
            self.shutdown.len()
        );
        let mut failed = 0;
        for (index, callback) in self.shutdown.iter().enumerate() {
            if !invoke_isolated("shutdown", index, || callback(reason)) {
                failed += 1;
            }
        }
        tracing::error!("Emergency shutdown dispatch complete ({} failed)", failed);
        failed
    }

    pub fn dispatch_alerts(&self, alerts: &[Alert]) -> usize {
        let mut failed = 0;
        for alert in alerts {
            for (index, callback) in self.alert.iter().enumerate() {
                let delivered =
                    invoke_isolated("alert", index, || callback(alert.level, alert.message.as_str()));
                if !delivered {
                    failed += 1;
                }
            }
        }
        failed
    }

    pub fn dispatch_actions(&self, actions: &[(ProtectiveAction, Channel)]) -> usize {
        let mut failed = 0;
        for &(action, channel) in actions {
            tracing::debug!("Protective action {} requested by {} channel", action, channel);
            for (index, callback) in self.action.iter().enumerate() {
                if !invoke_isolated("action", index, || callback(action, channel)) {
                    failed += 1;
                }
            }
        }
        failed
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("shutdown", &self.shutdown.len())
            .field("alert", &self.alert.len())
            .field("action", &self.action.len())
            .finish()
    }
}

/// Run one callback, swallowing errors and panics. Returns success.
fn invoke_isolated<F>(kind: &str, index: usize, callback: F) -> bool
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!("Error in {} callback #{}: {:#}", kind, index, e);
            false
        }
        Err(payload) => {
            tracing::error!(
                "Panic in {} callback #{}: {}",
                kind,
                index,
                panic_message(payload.as_ref())
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
