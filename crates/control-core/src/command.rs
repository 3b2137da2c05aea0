//! Command Interface
//!
//! The surface the external HTTP layer binds to URLs (spec §4.11, §6). Each
//! operation validates its inputs and returns a typed result or a typed
//! `CommandError`; parsing, authentication, and envelope formatting are the
//! HTTP layer's job, not this crate's.

use crate::config::ConfigStore;
use crate::constants::{KD_MAX, KI_MAX, KP_MAX, TARGET_TEMP_MAX, TARGET_TEMP_MIN};
use crate::errors::CommandError;
use crate::events::ModeChangeReason;
use crate::mode::{ModeController, StoredMode};
use crate::telemetry::{TelemetryRecord, TelemetrySink, TelemetryStore};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct ModeResult {
    pub mode: &'static str,
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModeSnapshot {
    pub mode: &'static str,
    pub target: f64,
    pub espresso_preference: f64,
    pub steam_preference: f64,
    pub steam_remaining: Option<u64>,
    pub machine_state: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gains {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub machine_state: &'static str,
    pub updated_at: Option<String>,
    pub description: &'static str,
}

fn describe(state: &str) -> &'static str {
    match state {
        "off" => "heat is not responding to commanded output",
        "heating" => "boiler is warming toward the active setpoint",
        "ready" => "boiler is holding at or near the active setpoint",
        _ => "not enough samples yet to classify machine state",
    }
}

/// Recognized individual gain names accepted by `set_gain` (spec §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainName {
    Proportional,
    Integral,
    Derivative,
    RecoveryProportional,
    RecoveryIntegral,
    RecoveryDerivative,
}

impl GainName {
    fn parse(name: &str) -> Result<Self, CommandError> {
        match name {
            "proportional" => Ok(GainName::Proportional),
            "integral" => Ok(GainName::Integral),
            "derivative" => Ok(GainName::Derivative),
            "recovery_proportional" => Ok(GainName::RecoveryProportional),
            "recovery_integral" => Ok(GainName::RecoveryIntegral),
            "recovery_derivative" => Ok(GainName::RecoveryDerivative),
            other => Err(CommandError::UnknownGain(other.to_string())),
        }
    }

    fn bounds(self) -> (f64, f64) {
        match self {
            GainName::Proportional | GainName::RecoveryProportional => (0.0, KP_MAX),
            GainName::Integral | GainName::RecoveryIntegral => (0.0, KI_MAX),
            GainName::Derivative | GainName::RecoveryDerivative => (0.0, KD_MAX),
        }
    }
}

pub struct CommandInterface<Sk: TelemetrySink> {
    config: Arc<ConfigStore>,
    mode: Arc<ModeController>,
    telemetry: Arc<TelemetryStore<Sk>>,
}

impl<Sk: TelemetrySink> CommandInterface<Sk> {
    pub fn new(config: Arc<ConfigStore>, mode: Arc<ModeController>, telemetry: Arc<TelemetryStore<Sk>>) -> Self {
        Self { config, mode, telemetry }
    }

    pub fn set_mode(&self, target: &str, duration: Option<u64>) -> Result<ModeResult, CommandError> {
        let stored = parse_mode(target)?;
        let (mode, setpoint) = self.mode.set_mode(stored, duration, ModeChangeReason::Manual)?;
        Ok(ModeResult { mode: mode.as_str(), target: setpoint })
    }

    pub fn get_mode(&self) -> ModeSnapshot {
        let config = self.config.current();
        let mode = self.mode.current();
        ModeSnapshot {
            mode: mode.as_str(),
            target: config.target_temperature,
            espresso_preference: config.espresso_temperature,
            steam_preference: config.steam_temperature,
            steam_remaining: self.mode.steam_remaining(),
            machine_state: machine_state_str(config.machine_state),
        }
    }

    pub fn set_target(&self, t: f64) -> Result<(f64, &'static str), CommandError> {
        if !(TARGET_TEMP_MIN..=TARGET_TEMP_MAX).contains(&t) {
            return Err(CommandError::OutOfRange { field: "target", value: t, min: TARGET_TEMP_MIN, max: TARGET_TEMP_MAX });
        }
        self.mode.set_target(t)?;
        Ok((t, self.mode.current().as_str()))
    }

    pub fn set_gains(&self, p: f64, i: f64, d: f64) -> Result<Gains, CommandError> {
        validate_range("proportional", p, 0.0, KP_MAX)?;
        validate_range("integral", i, 0.0, KI_MAX)?;
        validate_range("derivative", d, 0.0, KD_MAX)?;
        let mut config = self.config.current();
        config.proportional = p;
        config.integral = i;
        config.derivative = d;
        self.config.write(config)?;
        Ok(Gains { p, i, d })
    }

    pub fn set_gain(&self, name: &str, value: f64) -> Result<(String, f64), CommandError> {
        let gain = GainName::parse(name)?;
        let (min, max) = gain.bounds();
        validate_range(name, value, min, max)?;
        let mut config = self.config.current();
        match gain {
            GainName::Proportional => config.proportional = value,
            GainName::Integral => config.integral = value,
            GainName::Derivative => config.derivative = value,
            GainName::RecoveryProportional => config.recovery_proportional = value,
            GainName::RecoveryIntegral => config.recovery_integral = value,
            GainName::RecoveryDerivative => config.recovery_derivative = value,
        }
        self.config.write(config)?;
        Ok((name.to_string(), value))
    }

    pub fn history(&self, limit: usize) -> Result<Vec<TelemetryRecord>, CommandError> {
        if !(1..=10_000).contains(&limit) {
            return Err(CommandError::OutOfRange {
                field: "limit",
                value: limit as f64,
                min: 1.0,
                max: 10_000.0,
            });
        }
        Ok(self.telemetry.history(limit, None))
    }

    pub fn get_state(&self) -> StateSnapshot {
        let config = self.config.current();
        let state = machine_state_str(config.machine_state);
        StateSnapshot {
            machine_state: state,
            updated_at: config.machine_state_updated.clone(),
            description: describe(state),
        }
    }
}

fn machine_state_str(label: crate::config::MachineStateLabel) -> &'static str {
    use crate::config::MachineStateLabel;
    match label {
        MachineStateLabel::Off => "off",
        MachineStateLabel::Heating => "heating",
        MachineStateLabel::Ready => "ready",
        MachineStateLabel::Unknown => "unknown",
    }
}

fn parse_mode(name: &str) -> Result<StoredMode, CommandError> {
    match name {
        "off" => Ok(StoredMode::Off),
        "espresso" => Ok(StoredMode::Espresso),
        "steam" => Ok(StoredMode::Steam),
        other => Err(CommandError::InvalidMode(other.to_string())),
    }
}

fn validate_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), CommandError> {
    if value < min || value > max {
        Err(CommandError::OutOfRange { field, value, min, max })
    } else {
        Ok(())
    }
}
