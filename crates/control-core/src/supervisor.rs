//! Safety Supervisor
//!
//! Enforces the hard limits and failure-count shutdowns that sit between
//! the Sensor and the PID Engine (spec §4.4). Rule ordering is first-match-
//! wins; only one of `SensorFailure`, `HardOvertemp`, `AtOrAboveSetpoint`,
//! or `Nominal` applies per tick.

use crate::constants::{MAX_CONSECUTIVE_FAILURES, MAX_SAFE_TEMP};
use thermal::HardLimit;
use tracing::{error, warn};

/// What the Control Loop should do this tick, decided before any PID step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Below the failure threshold: skip PID and the actuator write this
    /// tick, but do not force the actuator to 0 (the hardware keeps
    /// whatever duty it was last commanded).
    SkipTick,
    /// At or past the failure threshold, or a hard overtemp: actuator must
    /// be written 0 immediately.
    Shutdown,
    /// Temperature is at or above the active setpoint: PID still steps (to
    /// keep derivative history current) but the actuator write is forced
    /// to 0.
    AtOrAboveSetpoint,
    /// Normal tick: PID computes duty, duty is clamped and written.
    Nominal,
}

pub struct Supervisor {
    consecutive_failures: u32,
    overtemp_limit: HardLimit<f64>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            consecutive_failures: 0,
            overtemp_limit: HardLimit::new(MAX_SAFE_TEMP),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Rule 1: a sensor failure this tick.
    pub fn sensor_failed(&mut self) -> Verdict {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            error!(
                failures = self.consecutive_failures,
                "consecutive sensor failures reached shutdown threshold"
            );
            Verdict::Shutdown
        } else {
            warn!(failures = self.consecutive_failures, "sensor read failed, skipping tick");
            Verdict::SkipTick
        }
    }

    /// A successful sensor read resets the failure counter.
    pub fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Rules 2-4, evaluated in order against a valid reading. `target` is
    /// the active setpoint for rule 3/4; rule 4 is log-only and does not
    /// change the verdict beyond what rule 3 already decided.
    pub fn evaluate(&mut self, temperature: f64, target: f64) -> Verdict {
        if self.overtemp_limit.is_exceeded(temperature) {
            self.consecutive_failures = MAX_CONSECUTIVE_FAILURES;
            error!(temperature, limit = MAX_SAFE_TEMP, "hard overtemp, shutting down");
            return Verdict::Shutdown;
        }

        if temperature >= target {
            if temperature > target + 10.0 {
                error!(temperature, target, "extreme overshoot above setpoint");
            }
            return Verdict::AtOrAboveSetpoint;
        }

        Verdict::Nominal
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
