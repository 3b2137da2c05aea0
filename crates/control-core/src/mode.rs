//! Mode Controller
//!
//! Owns the commanded operating regime (`off` / `espresso` / `steam`).
//! Transitions are total; the only automatic transition is the steam
//! watchdog expiring back to `espresso` (spec §4.5). The watchdog is
//! modeled as a cancellable `tokio` task rather than a hidden timer field:
//! its presence is itself the source of truth for "is steam currently
//! active," which avoids races between "mode written" and "timer fired."

use crate::config::ConfigStore;
use crate::constants::{STEAM_DURATION_DEFAULT_SECS, STEAM_DURATION_MAX_SECS, STEAM_DURATION_MIN_SECS};
use crate::errors::CommandError;
use crate::events::{Event, EventBus, ModeChangeReason};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredMode {
    Off,
    Espresso,
    Steam,
}

impl StoredMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StoredMode::Off => "off",
            StoredMode::Espresso => "espresso",
            StoredMode::Steam => "steam",
        }
    }
}

struct Watchdog {
    handle: JoinHandle<()>,
    deadline: Instant,
}

/// The commanded mode plus the steam watchdog. Safe for concurrent access
/// from any Command Interface caller.
pub struct ModeController {
    config: Arc<ConfigStore>,
    events: Arc<EventBus>,
    stored_mode: parking_lot::Mutex<StoredMode>,
    watchdog: parking_lot::Mutex<Option<Watchdog>>,
}

impl ModeController {
    pub fn new(config: Arc<ConfigStore>, events: Arc<EventBus>) -> Self {
        Self {
            config,
            events,
            stored_mode: parking_lot::Mutex::new(StoredMode::Espresso),
            watchdog: parking_lot::Mutex::new(None),
        }
    }

    /// `current()` returns `steam` if and only if the watchdog is armed,
    /// otherwise the stored mode (spec §4.5).
    pub fn current(&self) -> StoredMode {
        if self.watchdog.lock().is_some() {
            StoredMode::Steam
        } else {
            *self.stored_mode.lock()
        }
    }

    /// Seconds remaining on the steam watchdog, if armed.
    pub fn steam_remaining(&self) -> Option<u64> {
        let guard = self.watchdog.lock();
        guard.as_ref().map(|w| {
            let now = Instant::now();
            if w.deadline > now {
                (w.deadline - now).as_secs().max(1)
            } else {
                0
            }
        })
    }

    fn cancel_watchdog(&self) {
        if let Some(w) = self.watchdog.lock().take() {
            w.handle.abort();
        }
    }

    /// Sets the commanded mode (spec §4.5, §4.11 `set_mode`).
    pub fn set_mode(
        self: &Arc<Self>,
        target: StoredMode,
        duration: Option<u64>,
        reason: ModeChangeReason,
    ) -> Result<(StoredMode, f64), CommandError> {
        // A repeated, non-steam request for the mode already active is a
        // no-op: no config write, no duplicated `mode_change` event. Steam
        // always re-arms (spec §4.5 "re-entrance during an active steam
        // extends with the new duration").
        if target != StoredMode::Steam && target == self.current() {
            return Ok((target, self.config.current().target_temperature));
        }

        let duration_secs = match target {
            StoredMode::Steam => {
                let d = duration.unwrap_or(STEAM_DURATION_DEFAULT_SECS);
                if !(STEAM_DURATION_MIN_SECS..=STEAM_DURATION_MAX_SECS).contains(&d) {
                    return Err(CommandError::OutOfRange {
                        field: "duration",
                        value: d as f64,
                        min: STEAM_DURATION_MIN_SECS as f64,
                        max: STEAM_DURATION_MAX_SECS as f64,
                    });
                }
                Some(d)
            }
            _ => None,
        };

        let mut config = self.config.current();
        let new_setpoint = match target {
            StoredMode::Off => 0.0,
            StoredMode::Espresso => config.espresso_temperature,
            StoredMode::Steam => config.steam_temperature,
        };
        config.target_temperature = new_setpoint;
        self.config.write(config)?;

        self.cancel_watchdog();
        *self.stored_mode.lock() = target;

        if let (StoredMode::Steam, Some(d)) = (target, duration_secs) {
            let controller = Arc::clone(self);
            let deadline = Instant::now() + Duration::from_secs(d);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(d)).await;
                info!("steam watchdog expired, reverting to espresso");
                let _ = controller.set_mode(StoredMode::Espresso, None, ModeChangeReason::SteamTimeout);
            });
            *self.watchdog.lock() = Some(Watchdog { handle, deadline });
        }

        self.events.publish(Event::ModeChange { mode: target.as_str(), reason });

        Ok((target, new_setpoint))
    }

    /// `set_target` (spec §4.11): updates the active setpoint and the
    /// per-mode preference for the current mode (unless `off`).
    pub fn set_target(&self, t: f64) -> Result<(), CommandError> {
        let mut config = self.config.current();
        config.target_temperature = t;
        match self.current() {
            StoredMode::Espresso => config.espresso_temperature = t,
            StoredMode::Steam => config.steam_temperature = t,
            StoredMode::Off => {}
        }
        self.config.write(config)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_store(name: &str) -> Arc<ConfigStore> {
        let mut path = std::env::temp_dir();
        path.push(format!("boiler-control-core-mode-test-{}-{}.json", std::process::id(), name));
        let _ = std::fs::remove_file(&path);
        Arc::new(ConfigStore::load(path).unwrap())
    }

    #[tokio::test]
    async fn set_mode_steam_arms_watchdog_and_resolves_setpoint() {
        let config = temp_store("steam-arm");
        let controller = Arc::new(ModeController::new(config.clone(), Arc::new(EventBus::new())));
        let (mode, setpoint) = controller
            .set_mode(StoredMode::Steam, Some(60), ModeChangeReason::Manual)
            .unwrap();
        assert_eq!(mode, StoredMode::Steam);
        assert_eq!(setpoint, config.current().steam_temperature);
        assert_eq!(controller.current(), StoredMode::Steam);
        assert!(controller.steam_remaining().unwrap() <= 60);
    }

    #[tokio::test]
    async fn steam_duration_boundaries() {
        let config = temp_store("steam-bounds");
        let controller = Arc::new(ModeController::new(config, Arc::new(EventBus::new())));
        assert!(controller.set_mode(StoredMode::Steam, Some(9), ModeChangeReason::Manual).is_err());
        assert!(controller.set_mode(StoredMode::Steam, Some(10), ModeChangeReason::Manual).is_ok());
        assert!(controller.set_mode(StoredMode::Steam, Some(600), ModeChangeReason::Manual).is_ok());
        assert!(controller.set_mode(StoredMode::Steam, Some(601), ModeChangeReason::Manual).is_err());
    }

    #[tokio::test]
    async fn reentrant_steam_replaces_previous_watchdog() {
        let config = temp_store("steam-reentrant");
        let controller = Arc::new(ModeController::new(config, Arc::new(EventBus::new())));
        controller.set_mode(StoredMode::Steam, Some(10), ModeChangeReason::Manual).unwrap();
        controller.set_mode(StoredMode::Steam, Some(60), ModeChangeReason::Manual).unwrap();
        assert!(controller.steam_remaining().unwrap() > 10);
    }

    #[tokio::test]
    async fn repeated_identical_mode_emits_no_duplicate_event() {
        let config = temp_store("idempotent-mode");
        let events = Arc::new(EventBus::new());
        let controller = Arc::new(ModeController::new(config, events.clone()));
        let mut rx = events.subscribe();
        controller.set_mode(StoredMode::Espresso, None, ModeChangeReason::Manual).unwrap();
        controller.set_mode(StoredMode::Espresso, None, ModeChangeReason::Manual).unwrap();
        rx.recv().await.unwrap();
        // A second recv should time out: no duplicate event was published.
        let second = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn set_target_updates_per_mode_preference() {
        let config = temp_store("set-target");
        let controller = Arc::new(ModeController::new(config.clone(), Arc::new(EventBus::new())));
        controller.set_mode(StoredMode::Espresso, None, ModeChangeReason::Manual).unwrap();
        controller.set_target(92.0).unwrap();
        assert_eq!(config.current().target_temperature, 92.0);
        assert_eq!(config.current().espresso_temperature, 92.0);
    }
}
