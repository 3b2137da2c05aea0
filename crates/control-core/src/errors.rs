//! Typed failure modes for the control core's public seams.
//!
//! Exceptions-as-control-flow are modeled here as tagged `enum`s matched by
//! the Control Loop and Command Interface, rather than propagated as
//! opaque errors up to a generic handler.

use thiserror::Error;

/// Failure modes for a single `Sensor::read()` call (spec §4.1).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SensorError {
    #[error("sensor read timed out after the deadline")]
    Timeout,
    #[error("sensor driver process failed: exit code {code:?}, stderr: {stderr}")]
    ProcessError { code: Option<i32>, stderr: String },
    #[error("sensor driver output could not be parsed as a temperature")]
    ParseError,
    #[error("sensor reading {value} is outside the valid range [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
}

/// Failure modes for Configuration Store writes (spec §4.9).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("permission denied writing configuration, repair attempt failed: {0}")]
    PermissionDenied(#[source] std::io::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("io error accessing configuration: {0}")]
    Io(#[source] std::io::Error),
}

/// Validation and internal failures for Command Interface operations
/// (spec §4.11).
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{field} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("unknown gain name: {0}")]
    UnknownGain(String),
    #[error("invalid mode requested: {0}")]
    InvalidMode(String),
    #[error("internal failure: {0}")]
    Internal(#[from] ConfigError),
}
