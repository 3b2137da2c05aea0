//! Sensor Acquisition
//!
//! Wraps the boiler thermocouple (an MCP9600 on I2C) behind a single
//! `read()` call that blocks at most `TEMP_READ_TIMEOUT`. The underlying
//! driver is an out-of-process command that occasionally hangs on bus
//! contention, so the real implementation isolates every call behind
//! `tokio::time::timeout` and never leaves the call outstanding past the
//! deadline.

use crate::constants::{MAX_TEMP_READING, MIN_TEMP, TEMP_READ_TIMEOUT};
use crate::errors::SensorError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command as ProcessCommand;
use tracing::warn;

/// A single validated temperature reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature: f64,
    pub timestamp_millis: i64,
    pub source_ok: bool,
}

/// Anything that can produce one Celsius sample per call (spec §4.1).
#[async_trait]
pub trait Sensor: Send + Sync {
    async fn read(&self) -> Result<Reading, SensorError>;
}

fn validate(value: f64) -> Result<f64, SensorError> {
    if value < MIN_TEMP || value > MAX_TEMP_READING {
        Err(SensorError::OutOfRange {
            value,
            min: MIN_TEMP,
            max: MAX_TEMP_READING,
        })
    } else {
        Ok(value)
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Invokes an external sensor driver binary once per `read()`, parsing a
/// single decimal Celsius value from its stdout. Exit code 0 and parseable
/// output are required for success.
pub struct ProcessSensor {
    driver_path: String,
}

impl ProcessSensor {
    pub fn new(driver_path: impl Into<String>) -> Self {
        Self {
            driver_path: driver_path.into(),
        }
    }

    async fn invoke(&self) -> Result<f64, SensorError> {
        let output = ProcessCommand::new(&self.driver_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|_| SensorError::ProcessError {
                code: None,
                stderr: "failed to spawn sensor driver".into(),
            })?;

        if !output.status.success() {
            return Err(SensorError::ProcessError {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout);
        text.trim().parse::<f64>().map_err(|_| SensorError::ParseError)
    }
}

#[async_trait]
impl Sensor for ProcessSensor {
    async fn read(&self) -> Result<Reading, SensorError> {
        let result = tokio::time::timeout(TEMP_READ_TIMEOUT, self.invoke()).await;

        let raw = match result {
            Ok(inner) => inner?,
            Err(_) => {
                warn!("sensor driver did not respond within the read deadline");
                return Err(SensorError::Timeout);
            }
        };

        let temperature = validate(raw)?;
        Ok(Reading {
            temperature,
            timestamp_millis: now_millis(),
            source_ok: true,
        })
    }
}

/// A test/simulation double whose next reading (or failure) is set
/// directly, for driving the control loop without real hardware.
pub struct MockSensor {
    next: parking_lot::Mutex<Result<f64, SensorError>>,
}

impl MockSensor {
    pub fn new(initial_temperature: f64) -> Self {
        Self {
            next: parking_lot::Mutex::new(Ok(initial_temperature)),
        }
    }

    pub fn set_next(&self, temperature: f64) {
        *self.next.lock() = Ok(temperature);
    }

    pub fn fail_next(&self, error: SensorError) {
        *self.next.lock() = Err(error);
    }
}

#[async_trait]
impl Sensor for MockSensor {
    async fn read(&self) -> Result<Reading, SensorError> {
        let value = self.next.lock().clone()?;
        let temperature = validate(value)?;
        Ok(Reading {
            temperature,
            timestamp_millis: now_millis(),
            source_ok: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_sensor_validates_range() {
        let sensor = MockSensor::new(250.0);
        let result = sensor.read().await;
        assert!(matches!(result, Err(SensorError::OutOfRange { .. })));
    }

    #[tokio::test]
    async fn mock_sensor_accepts_boundary_values() {
        let sensor = MockSensor::new(0.0);
        assert!(sensor.read().await.is_ok());
        sensor.set_next(200.0);
        assert!(sensor.read().await.is_ok());
        sensor.set_next(200.1);
        assert!(sensor.read().await.is_err());
    }

    #[tokio::test]
    async fn mock_sensor_reports_injected_failure() {
        let sensor = MockSensor::new(100.0);
        sensor.fail_next(SensorError::Timeout);
        assert_eq!(sensor.read().await, Err(SensorError::Timeout));
    }
}
