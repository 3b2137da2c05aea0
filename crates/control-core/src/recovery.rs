//! Recovery Detector
//!
//! Watches for a sudden, large temperature drop (a cold-water refill) and
//! flags when the Control Loop should swap the PID Engine onto the more
//! aggressive recovery gain profile, and when it should swap back (spec
//! §4.7). Hysteresis (entering at a 5 °C drop, exiting at setpoint − 5)
//! keeps the profile from flapping while the boiler approaches setpoint.

use crate::classifier::TemperatureWindow;
use crate::constants::{RECOVERY_DROP_THRESHOLD, RECOVERY_EXIT_MARGIN, RECOVERY_WINDOW_SECONDS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Normal,
    Recovery,
}

pub struct RecoveryDetector {
    state: RecoveryState,
}

impl RecoveryDetector {
    pub fn new() -> Self {
        Self { state: RecoveryState::Normal }
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// Re-evaluates recovery state given the current window and target
    /// setpoint. Returns `true` if the state changed this call (the
    /// Control Loop uses this to decide whether to rebuild the PID
    /// Engine).
    pub fn update(&mut self, window: &TemperatureWindow, target: f64) -> bool {
        let Some(t_now) = window.latest() else {
            return false;
        };
        let window_millis = RECOVERY_WINDOW_SECONDS * 1000;

        let next = match self.state {
            RecoveryState::Normal => {
                let t_max = window.max_within(window_millis).unwrap_or(t_now);
                if t_max - t_now >= RECOVERY_DROP_THRESHOLD && t_now < target && t_now < t_max {
                    RecoveryState::Recovery
                } else {
                    RecoveryState::Normal
                }
            }
            RecoveryState::Recovery => {
                if t_now >= target - RECOVERY_EXIT_MARGIN {
                    RecoveryState::Normal
                } else {
                    RecoveryState::Recovery
                }
            }
        };

        let changed = next != self.state;
        self.state = next;
        changed
    }
}

impl Default for RecoveryDetector {
    fn default() -> Self {
        Self::new()
    }
}
