//! State Classifier
//!
//! Derives the observed `machine_state` (off / heating / ready) from a
//! sliding window of temperature readings and the current commanded duty.
//! This is distinct from the commanded `Mode`: a machine can be in mode
//! `espresso` while its classifier reports `off` because the user switched
//! off the wall power and the element no longer responds (spec §4.6).

use crate::constants::{STATE_DETECTION_WINDOW_MS, TEMP_HISTORY_SIZE};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Off,
    Heating,
    Ready,
    Unknown,
}

impl MachineState {
    pub fn as_str(self) -> &'static str {
        match self {
            MachineState::Off => "off",
            MachineState::Heating => "heating",
            MachineState::Ready => "ready",
            MachineState::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    temperature: f64,
    timestamp_millis: i64,
}

/// The bounded reading history shared by the Classifier and Recovery
/// Detector (spec §4.6, §4.7 both read the same window).
pub struct TemperatureWindow {
    samples: VecDeque<Sample>,
}

impl TemperatureWindow {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(TEMP_HISTORY_SIZE),
        }
    }

    pub fn push(&mut self, temperature: f64, timestamp_millis: i64) {
        if self.samples.len() == TEMP_HISTORY_SIZE {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { temperature, timestamp_millis });
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().map(|s| s.temperature)
    }

    /// Maximum temperature within the last `window_millis` of readings,
    /// inclusive of the latest sample.
    pub fn max_within(&self, window_millis: i64) -> Option<f64> {
        let now = self.samples.back()?.timestamp_millis;
        self.samples
            .iter()
            .filter(|s| now - s.timestamp_millis <= window_millis)
            .map(|s| s.temperature)
            .fold(None, |acc, t| Some(acc.map_or(t, |a: f64| a.max(t))))
    }

    /// Temperature rise (latest - oldest in the window); negative means
    /// falling.
    fn rise_over(&self, window_millis: i64) -> Option<f64> {
        let latest = self.samples.back()?;
        let oldest_in_window = self
            .samples
            .iter()
            .find(|s| latest.timestamp_millis - s.timestamp_millis <= window_millis)?;
        Some(latest.temperature - oldest_in_window.temperature)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for TemperatureWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Classifies the current machine state (spec §4.6). `duty_percent` is the
/// commanded output as a 0..100 percentage, `target` is the active
/// setpoint.
pub fn classify(window: &TemperatureWindow, duty_percent: f64, target: f64) -> MachineState {
    let Some(t) = window.latest() else {
        return MachineState::Unknown;
    };

    // Rule 1: off if cooling under drive.
    if let Some(rise) = window.rise_over(STATE_DETECTION_WINDOW_MS) {
        if rise <= -0.3 && duty_percent > 10.0 {
            return MachineState::Off;
        }
    }

    // Rule 2: active zone.
    if t > 80.0 {
        return if t >= target * (1.0 - 0.02) {
            MachineState::Ready
        } else {
            MachineState::Heating
        };
    }

    // Rule 3: at/above setpoint in cool zone.
    if t >= target * (1.0 - 0.02) || t >= target {
        return MachineState::Ready;
    }

    // Rule 4: rising and warm.
    if let Some(rise) = window.rise_over(STATE_DETECTION_WINDOW_MS) {
        if rise >= 1.0 && t > 40.0 {
            return MachineState::Heating;
        }
    }

    // Rule 5: driven but unclear.
    if duty_percent > 20.0 {
        return if t > 40.0 { MachineState::Heating } else { MachineState::Off };
    }

    // Rule 6: default.
    MachineState::Off
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_before_any_sample() {
        let window = TemperatureWindow::new();
        assert_eq!(classify(&window, 0.0, 100.0), MachineState::Unknown);
    }

    #[test]
    fn cooling_under_drive_is_off() {
        let mut window = TemperatureWindow::new();
        window.push(90.0, 0);
        window.push(89.0, 30_000);
        window.push(89.5, 60_000);
        // rise = 89.5 - 90.0 = -0.5 <= -0.3, duty > 10
        assert_eq!(classify(&window, 15.0, 100.0), MachineState::Off);
    }

    #[test]
    fn active_zone_above_eighty_classifies_ready_near_setpoint() {
        let mut window = TemperatureWindow::new();
        window.push(99.0, 0);
        assert_eq!(classify(&window, 5.0, 100.0), MachineState::Ready);
    }

    #[test]
    fn active_zone_above_eighty_classifies_heating_below_threshold() {
        let mut window = TemperatureWindow::new();
        window.push(85.0, 0);
        assert_eq!(classify(&window, 5.0, 100.0), MachineState::Heating);
    }

    #[test]
    fn rising_and_warm_is_heating() {
        let mut window = TemperatureWindow::new();
        window.push(50.0, 0);
        window.push(51.5, 30_000);
        assert_eq!(classify(&window, 0.0, 100.0), MachineState::Heating);
    }

    #[test]
    fn driven_but_unclear_below_forty_is_off() {
        let mut window = TemperatureWindow::new();
        window.push(30.0, 0);
        assert_eq!(classify(&window, 25.0, 100.0), MachineState::Off);
    }

    #[test]
    fn default_idle_is_off() {
        let mut window = TemperatureWindow::new();
        window.push(30.0, 0);
        assert_eq!(classify(&window, 0.0, 100.0), MachineState::Off);
    }
}
