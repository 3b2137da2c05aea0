//! PID Engine
//!
//! Adapts the generic `thermal::Pid<f64>` to the boiler's fixed duty range
//! `[0, 255]` and the two gain profiles (normal, recovery) the Control Loop
//! swaps between. A profile swap is modeled as the spec requires: `reset()`
//! followed by a fresh `Pid::new(...)`, discarding the integral, because
//! recovery tuning is a structurally different regime from normal tuning
//! (spec §4.3).

use thermal::Pid;

/// Which gain profile is currently driving the engine. Recorded on every
/// Telemetry Record (spec §3, §8 invariant on `pid_mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Normal,
    Recovery,
}

impl EngineMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineMode::Normal => "normal",
            EngineMode::Recovery => "recovery",
        }
    }
}

/// A gain triple for one of the two profiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

pub struct PidEngine {
    pid: Pid<f64>,
    mode: EngineMode,
}

impl PidEngine {
    pub fn new(setpoint: f64, gains: Gains) -> Self {
        Self {
            pid: Pid::new(gains.kp, gains.ki, gains.kd, setpoint, 0.0, 255.0),
            mode: EngineMode::Normal,
        }
    }

    /// Advances one sample period (Δt = 1 s) and returns the raw, unclamped
    /// duty. The Control Loop is responsible for the setpoint-override and
    /// overtemp rules (§4.4) on top of this value; this call only runs the
    /// control law itself.
    pub fn step(&mut self, measurement: f64) -> u8 {
        let output = self.pid.step(measurement, 1.0);
        output.round().clamp(0.0, 255.0) as u8
    }

    /// Zeroes integral and previous-error, keeping gains and setpoint. Used
    /// on the `off -> heating` classifier transition (spec invariant 7).
    pub fn reset(&mut self) {
        self.pid.reset();
    }

    /// Live setpoint/gain update that preserves integral state — used when
    /// the same regime continues (e.g. a configuration hot-reload changing
    /// gains without a mode or recovery-state transition).
    pub fn reconfigure(&mut self, setpoint: f64, gains: Gains) {
        self.pid.reconfigure(setpoint, gains.kp, gains.ki, gains.kd);
    }

    /// Rebuilds the engine for a different gain profile, discarding
    /// integral and previous-error. This is the only path that changes
    /// `mode()`; it is what the Control Loop calls on Recovery Detector
    /// transitions.
    pub fn swap_profile(&mut self, setpoint: f64, gains: Gains, mode: EngineMode) {
        self.pid = Pid::new(gains.kp, gains.ki, gains.kd, setpoint, 0.0, 255.0);
        self.mode = mode;
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn setpoint(&self) -> f64 {
        self.pid.setpoint
    }
}

/// Converts a duty byte to the 0..100 percent used by telemetry and the
/// classifier (spec glossary: "percentage = duty/2.55").
pub fn duty_to_percent(duty: u8) -> f64 {
    f64::from(duty) / 2.55
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_profile_discards_integral_and_changes_mode() {
        let mut engine = PidEngine::new(100.0, Gains { kp: 1.0, ki: 1.0, kd: 0.0 });
        for _ in 0..20 {
            engine.step(90.0);
        }
        assert_eq!(engine.mode(), EngineMode::Normal);
        engine.swap_profile(100.0, Gains { kp: 6.0, ki: 0.2, kd: 8.0 }, EngineMode::Recovery);
        assert_eq!(engine.mode(), EngineMode::Recovery);
        // A fresh engine at the setpoint outputs exactly kp * 0 + ki * 0 = 0.
        let output = engine.step(100.0);
        assert_eq!(output, 0);
    }

    #[test]
    fn duty_to_percent_matches_glossary_definition() {
        assert!((duty_to_percent(255) - 100.0).abs() < 1e-9);
        assert!((duty_to_percent(0) - 0.0).abs() < 1e-9);
    }
}
