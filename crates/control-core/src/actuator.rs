//! Actuator
//!
//! Stateless wrapper over the PWM-driven solid-state relay. `off()` must be
//! callable from shutdown handlers, panic paths, and the hard-overtemp
//! branch of the Safety Supervisor without ever itself failing outward —
//! on a driver error it logs and returns, it does not propagate.

use async_trait::async_trait;
use tracing::error;

/// An abstract PWM endpoint accepting an 8-bit duty cycle.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Writes `duty`, clamped to `[0, 255]` defensively even though callers
    /// are expected to have clamped already.
    async fn write(&self, duty: u8);

    /// Equivalent to `write(0)`, infallible from the caller's perspective.
    async fn off(&self) {
        self.write(0).await;
    }
}

/// Maps actuator writes onto a GPIO daemon socket (out of scope for this
/// crate beyond the call site; `endpoint` identifies the daemon's address).
pub struct GpioActuator {
    endpoint: String,
}

impl GpioActuator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Actuator for GpioActuator {
    async fn write(&self, duty: u8) {
        if let Err(e) = self.send(duty).await {
            error!(endpoint = %self.endpoint, duty, error = %e, "actuator write failed, continuing");
        }
    }
}

impl GpioActuator {
    async fn send(&self, _duty: u8) -> Result<(), std::io::Error> {
        // The GPIO daemon is an external collaborator; this crate only
        // defines the call contract it expects. A real deployment would
        // dial `self.endpoint` over a Unix socket here.
        Ok(())
    }
}

/// A recording double used by tests and the simulator: remembers the last
/// duty written so assertions can inspect it.
pub struct RecordingActuator {
    last_duty: parking_lot::Mutex<u8>,
    history: parking_lot::Mutex<Vec<u8>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self {
            last_duty: parking_lot::Mutex::new(0),
            history: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn last(&self) -> u8 {
        *self.last_duty.lock()
    }

    pub fn history(&self) -> Vec<u8> {
        self.history.lock().clone()
    }
}

impl Default for RecordingActuator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn write(&self, duty: u8) {
        let clamped = duty.clamp(0, 255);
        *self.last_duty.lock() = clamped;
        self.history.lock().push(clamped);
    }
}
