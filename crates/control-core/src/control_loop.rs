//! Control Loop
//!
//! The 1 Hz orchestrator: Sensor -> Supervisor -> PID Engine -> Actuator ->
//! Classifier -> Telemetry (spec §4.10). `tick()` is wrapped by the caller
//! in a `tokio::sync::Mutex::try_lock`, which is how re-entrance is
//! prevented: if a tick is still running when the next interval fires, the
//! new tick is skipped and logged rather than queued, matching the spec's
//! "if already_running: skip this tick" contract without needing unsafe
//! shared state.

use crate::actuator::Actuator;
use crate::classifier::{self, MachineState, TemperatureWindow};
use crate::config::ConfigStore;
use crate::events::{Event, EventBus};
use crate::mode::ModeController;
use crate::pid_engine::{duty_to_percent, EngineMode, Gains, PidEngine};
use crate::recovery::{RecoveryDetector, RecoveryState};
use crate::sensor::Sensor;
use crate::supervisor::{Supervisor, Verdict};
use crate::telemetry::{RecordMode, TelemetryRecord, TelemetrySink, TelemetryStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

fn normal_gains(config: &crate::config::Config) -> Gains {
    Gains { kp: config.proportional, ki: config.integral, kd: config.derivative }
}

fn recovery_gains(config: &crate::config::Config) -> Gains {
    Gains {
        kp: config.recovery_proportional,
        ki: config.recovery_integral,
        kd: config.recovery_derivative,
    }
}

/// Mutable per-tick state, held behind the re-entrance guard.
struct LoopState {
    window: TemperatureWindow,
    supervisor: Supervisor,
    recovery: RecoveryDetector,
    engine: PidEngine,
    prev_state: MachineState,
    reset_armed: bool,
    /// The `(target, gains)` pair last pushed into `engine`, so a plain
    /// configuration change (a new setpoint from `Mode Controller::set_mode`
    /// / `set_target`, or new gains from `set_gains`/`set_gain`) can be
    /// detected and applied at the next tick boundary (spec §4.9, ordering
    /// guarantee #4) even when no recovery-state transition happens to
    /// trigger a `swap_profile`.
    applied_target: f64,
    applied_gains: Gains,
}

pub struct ControlLoop<Sn: Sensor, Ac: Actuator, Sk: TelemetrySink> {
    sensor: Arc<Sn>,
    actuator: Arc<Ac>,
    config: Arc<ConfigStore>,
    mode: Arc<ModeController>,
    events: Arc<EventBus>,
    telemetry: Arc<TelemetryStore<Sk>>,
    state: tokio::sync::Mutex<LoopState>,
}

impl<Sn: Sensor, Ac: Actuator, Sk: TelemetrySink> ControlLoop<Sn, Ac, Sk> {
    pub fn new(
        sensor: Arc<Sn>,
        actuator: Arc<Ac>,
        config: Arc<ConfigStore>,
        mode: Arc<ModeController>,
        events: Arc<EventBus>,
        telemetry: Arc<TelemetryStore<Sk>>,
    ) -> Self {
        let cfg = config.current();
        let gains = normal_gains(&cfg);
        let engine = PidEngine::new(cfg.target_temperature, gains);
        Self {
            sensor,
            actuator,
            config,
            mode,
            events,
            telemetry,
            state: tokio::sync::Mutex::new(LoopState {
                window: TemperatureWindow::new(),
                supervisor: Supervisor::new(),
                recovery: RecoveryDetector::new(),
                engine,
                prev_state: MachineState::Unknown,
                reset_armed: false,
                applied_target: cfg.target_temperature,
                applied_gains: gains,
            }),
        }
    }

    /// Runs one tick. Returns immediately, logging and doing nothing, if a
    /// tick is already in progress.
    pub async fn tick(&self) {
        let Ok(mut state) = self.state.try_lock() else {
            warn!("previous tick still running, skipping this tick");
            return;
        };

        // Single consistent configuration snapshot for the whole tick
        // (ordering guarantee #1, spec §5).
        let config = self.config.current();
        let target = config.target_temperature;

        let reading = self.sensor.read().await;
        let reading = match reading {
            Ok(r) => r,
            Err(e) => {
                let verdict = state.supervisor.sensor_failed();
                if verdict == Verdict::Shutdown {
                    self.actuator.off().await;
                }
                warn!(error = %e, "sensor read failed");
                return;
            }
        };
        state.supervisor.reset_failures();
        state.window.push(reading.temperature, reading.timestamp_millis);

        if state.supervisor.evaluate(reading.temperature, target) == Verdict::Shutdown {
            self.actuator.off().await;
            return;
        }

        let recovery_changed = state.recovery.update(&state.window, target);
        let active_mode = match state.recovery.state() {
            RecoveryState::Recovery => EngineMode::Recovery,
            RecoveryState::Normal => EngineMode::Normal,
        };
        let active_gains = match active_mode {
            EngineMode::Recovery => recovery_gains(&config),
            EngineMode::Normal => normal_gains(&config),
        };

        if recovery_changed {
            state.engine.swap_profile(target, active_gains, active_mode);
            info!(mode = active_mode.as_str(), "recovery state changed, rebuilt pid engine");
            state.applied_target = target;
            state.applied_gains = active_gains;
        } else if target != state.applied_target || active_gains != state.applied_gains {
            // No regime change, but the setpoint and/or gains read from
            // Configuration this tick differ from what the engine is
            // currently running with (a `set_mode`/`set_target` setpoint
            // write, or a `set_gains`/`set_gain` write). Push the live
            // values in without discarding integral/derivative history.
            state.engine.reconfigure(target, active_gains);
            state.applied_target = target;
            state.applied_gains = active_gains;
        }

        let mut duty_raw = state.engine.step(reading.temperature);
        let duty_percent = duty_to_percent(duty_raw);
        let machine_state = classifier::classify(&state.window, duty_percent, target);

        if state.prev_state == MachineState::Off && machine_state == MachineState::Heating && !state.reset_armed {
            state.engine.reset();
            duty_raw = state.engine.step(reading.temperature);
            state.reset_armed = true;
        }
        if machine_state == MachineState::Off {
            state.reset_armed = false;
        }

        let duty = if reading.temperature >= target { 0 } else { duty_raw };
        self.actuator.write(duty).await;

        if machine_state != state.prev_state {
            self.config.write({
                let mut c = self.config.current();
                c.machine_state = to_label(machine_state);
                c.machine_state_updated = Some(Utc::now().to_rfc3339());
                c
            }).ok();
            self.events.publish(Event::MachineState {
                state: machine_state.as_str(),
                updated_at: Utc::now().to_rfc3339(),
            });
        }
        state.prev_state = machine_state;

        let record = TelemetryRecord {
            temperature: reading.temperature,
            output_percent: duty_to_percent(duty),
            timestamp_millis: reading.timestamp_millis,
            pid_mode: RecordMode::from(state.engine.mode()),
        };
        self.telemetry.enqueue_if_recordable(record, machine_state);
    }

    pub fn mode_controller(&self) -> &Arc<ModeController> {
        &self.mode
    }
}

fn to_label(state: MachineState) -> crate::config::MachineStateLabel {
    use crate::config::MachineStateLabel;
    match state {
        MachineState::Off => MachineStateLabel::Off,
        MachineState::Heating => MachineStateLabel::Heating,
        MachineState::Ready => MachineStateLabel::Ready,
        MachineState::Unknown => MachineStateLabel::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::RecordingActuator;
    use crate::sensor::MockSensor;
    use crate::telemetry::InMemorySink;

    fn temp_config(name: &str) -> Arc<ConfigStore> {
        let mut path = std::env::temp_dir();
        path.push(format!("boiler-control-core-loop-test-{}-{}.json", std::process::id(), name));
        let _ = std::fs::remove_file(&path);
        Arc::new(ConfigStore::load(path).unwrap())
    }

    #[tokio::test]
    async fn writes_zero_duty_at_or_above_setpoint() {
        let config = temp_config("at-setpoint");
        let events = Arc::new(EventBus::new());
        let mode = Arc::new(ModeController::new(config.clone(), events.clone()));
        let sensor = Arc::new(MockSensor::new(100.0));
        let actuator = Arc::new(RecordingActuator::new());
        let telemetry = Arc::new(TelemetryStore::new(InMemorySink::new()));
        let loop_ = ControlLoop::new(sensor, actuator.clone(), config, mode, events, telemetry);
        loop_.tick().await;
        assert_eq!(actuator.last(), 0);
    }

    #[tokio::test]
    async fn overtemp_forces_shutdown_within_the_tick() {
        let config = temp_config("overtemp");
        let events = Arc::new(EventBus::new());
        let mode = Arc::new(ModeController::new(config.clone(), events.clone()));
        let sensor = Arc::new(MockSensor::new(165.0));
        let actuator = Arc::new(RecordingActuator::new());
        let telemetry = Arc::new(TelemetryStore::new(InMemorySink::new()));
        let loop_ = ControlLoop::new(sensor, actuator.clone(), config, mode, events, telemetry);
        loop_.tick().await;
        assert_eq!(actuator.last(), 0);
    }

    #[tokio::test]
    async fn sensor_failures_below_threshold_leave_actuator_untouched() {
        let config = temp_config("sensor-fail");
        let events = Arc::new(EventBus::new());
        let mode = Arc::new(ModeController::new(config.clone(), events.clone()));
        let sensor = Arc::new(MockSensor::new(90.0));
        let actuator = Arc::new(RecordingActuator::new());
        let telemetry = Arc::new(TelemetryStore::new(InMemorySink::new()));
        let loop_ = ControlLoop::new(sensor.clone(), actuator.clone(), config, mode, events, telemetry);
        loop_.tick().await;
        let writes_after_first_tick = actuator.history().len();

        sensor.fail_next(crate::errors::SensorError::Timeout);
        loop_.tick().await;
        assert_eq!(actuator.history().len(), writes_after_first_tick, "no new write on a below-threshold failure");
    }

    /// Spec §4.9: "a change triggers PID engine rebuild at the next tick
    /// boundary." A plain setpoint change (e.g. `espresso -> steam`) must
    /// reach the live PID engine's internal setpoint, not just the
    /// Supervisor's raw `temperature >= target` override check.
    #[tokio::test]
    async fn config_target_change_reaches_the_live_pid_engine_next_tick() {
        let config = temp_config("target-change-reconfigure");
        let events = Arc::new(EventBus::new());
        let mode = Arc::new(ModeController::new(config.clone(), events.clone()));
        let sensor = Arc::new(MockSensor::new(90.0));
        let actuator = Arc::new(RecordingActuator::new());
        let telemetry = Arc::new(TelemetryStore::new(InMemorySink::new()));
        let loop_ = ControlLoop::new(sensor.clone(), actuator.clone(), config.clone(), mode, events, telemetry);

        // Tick once at the default target (100) so the engine's internal
        // setpoint starts at 100.
        loop_.tick().await;

        // Raise the setpoint to 140 purely via a config write, as
        // `ModeController::set_mode`/`set_target` would on an
        // `espresso -> steam` switch, without going through a recovery
        // transition.
        let mut raised = config.current();
        raised.target_temperature = 140.0;
        config.write(raised).unwrap();

        // At 120 the boiler is below the new 140 target, so the Supervisor
        // does not force a zero write. If the engine's internal setpoint is
        // still stuck at 100, the error is 100 - 120 = -20 and the output
        // clamps to 0. If reconfigure() actually ran, the error is
        // 140 - 120 = +20 and the engine commands positive duty.
        sensor.set_next(120.0);
        loop_.tick().await;
        assert!(actuator.last() > 0, "engine setpoint did not pick up the config's new target_temperature");
    }
}
