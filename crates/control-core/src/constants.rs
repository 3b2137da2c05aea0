//! Compiled-in thresholds from the specification. Centralized here so the
//! Control Loop, Supervisor, Classifier, and Recovery Detector all read the
//! same numbers.

use std::time::Duration;

/// Tick period of the Control Loop.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Hard ceiling above which the actuator is cut regardless of setpoint.
pub const MAX_SAFE_TEMP: f64 = 160.0;

/// Consecutive sensor failures before a latched shutdown.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Sensor read deadline.
pub const TEMP_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Valid sensor reading range.
pub const MIN_TEMP: f64 = 0.0;
pub const MAX_TEMP_READING: f64 = 200.0;

/// Telemetry batch size before a flush.
pub const BATCH_SIZE: usize = 10;
/// Bounded in-memory cap for buffered records if the store is unavailable,
/// recommended as 10x BATCH_SIZE (spec §7).
pub const TELEMETRY_BUFFER_CAP: usize = BATCH_SIZE * 10;

/// Retention window for telemetry records.
pub const RETENTION_DAYS: i64 = 7;
/// How often the retention sweep runs.
pub const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// How often `off` state is recorded to limit flash writes.
pub const OFF_STATE_RECORDING_INTERVAL_MS: i64 = 180_000;

/// Sliding window size (sample count) kept by the Control Loop for the
/// Classifier and Recovery Detector.
pub const TEMP_HISTORY_SIZE: usize = 60;
/// Decision window used by the Classifier.
pub const STATE_DETECTION_WINDOW_MS: i64 = 60_000;

/// Recovery Detector window and thresholds.
pub const RECOVERY_WINDOW_SECONDS: i64 = 60;
pub const RECOVERY_DROP_THRESHOLD: f64 = 5.0;
pub const RECOVERY_EXIT_MARGIN: f64 = 5.0;

/// Steam mode watchdog duration bounds and default.
pub const STEAM_DURATION_MIN_SECS: u64 = 10;
pub const STEAM_DURATION_MAX_SECS: u64 = 600;
pub const STEAM_DURATION_DEFAULT_SECS: u64 = 300;

/// Configuration hot-reload poll interval.
pub const CONFIG_RELOAD_INTERVAL: Duration = Duration::from_secs(10);

/// Valid target-temperature range accepted by the Command Interface and
/// Config Store.
pub const TARGET_TEMP_MIN: f64 = 0.0;
pub const TARGET_TEMP_MAX: f64 = 200.0;
pub const PER_MODE_TEMP_MIN: f64 = 80.0;
pub const PER_MODE_TEMP_MAX: f64 = 150.0;

pub const KP_MAX: f64 = 10.0;
pub const KI_MAX: f64 = 5.0;
pub const KD_MAX: f64 = 100.0;

/// PID output duty range.
pub const DUTY_MIN: u8 = 0;
pub const DUTY_MAX: u8 = 255;
