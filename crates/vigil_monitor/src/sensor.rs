//! Sensor reader collaborator
//!
//! The monitor asks for three independent readings per tick. Each read runs
//! in its own task under a timeout, so a hung or panicking driver costs one
//! failed channel for one tick and nothing more.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use vigil_core::{Channel, SensorError};

/// Hardware access for the three monitored channels.
#[async_trait]
pub trait SensorReader: Send + Sync + 'static {
    /// Die temperature in °C
    async fn read_temperature(&self) -> Result<f64, SensorError>;

    /// Supply current in mA
    async fn read_current(&self) -> Result<f64, SensorError>;

    /// Neural activity amplitude in µV
    async fn read_neural_activity(&self) -> Result<f64, SensorError>;
}

/// Raw results of one tick, before evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReadings {
    pub thermal: Result<f64, SensorError>,
    pub power: Result<f64, SensorError>,
    pub neural: Result<f64, SensorError>,
}

impl RawReadings {
    pub fn get(&self, channel: Channel) -> &Result<f64, SensorError> {
        match channel {
            Channel::Thermal => &self.thermal,
            Channel::Power => &self.power,
            Channel::Neural => &self.neural,
        }
    }
}

/// Read all channels concurrently, each bounded by `timeout`.
pub async fn read_all(sensors: &Arc<dyn SensorReader>, timeout: Duration) -> RawReadings {
    let (thermal, power, neural) = tokio::join!(
        read_channel(Arc::clone(sensors), Channel::Thermal, timeout),
        read_channel(Arc::clone(sensors), Channel::Power, timeout),
        read_channel(Arc::clone(sensors), Channel::Neural, timeout),
    );
    RawReadings {
        thermal,
        power,
        neural,
    }
}

async fn read_channel(
    sensors: Arc<dyn SensorReader>,
    channel: Channel,
    timeout: Duration,
) -> Result<f64, SensorError> {
    let mut task = tokio::spawn(async move {
        match channel {
            Channel::Thermal => sensors.read_temperature().await,
            Channel::Power => sensors.read_current().await,
            Channel::Neural => sensors.read_neural_activity().await,
        }
    });

    let value = match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(result)) => result.map_err(|e| e.with_channel(channel))?,
        Ok(Err(join_error)) => {
            return Err(SensorError::hardware(
                channel,
                format!("sensor task failed: {}", join_error),
            ))
        }
        Err(_) => {
            task.abort();
            return Err(SensorError::Timeout {
                channel,
                timeout_ms: timeout.as_millis() as u64,
            });
        }
    };

    if value.is_finite() {
        Ok(value)
    } else {
        Err(SensorError::InvalidReading { channel, value })
    }
}
