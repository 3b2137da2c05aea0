//! A minimal hard-limit primitive reused by the control core's safety
//! supervisor for the "never exceed this temperature" check.

use num_traits::Float;

/// An absolute temperature ceiling that must never be crossed, independent
/// of setpoint or control mode. Distinct from the PID's output clamp: this
/// is a physical safety bound on the *measurement*, not the actuator
/// output.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HardLimit<F: Float> {
    pub max_temp: F,
}

impl<F: Float> HardLimit<F> {
    pub fn new(max_temp: F) -> Self {
        Self { max_temp }
    }

    /// Returns `true` if `temperature` is strictly above the configured
    /// ceiling.
    pub fn is_exceeded(&self, temperature: F) -> bool {
        temperature > self.max_temp
    }
}
