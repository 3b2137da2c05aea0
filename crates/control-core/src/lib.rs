//! Safety-critical PID control core for a single-boiler espresso machine.
//!
//! A K-type thermocouple senses boiler temperature; a PWM-driven
//! solid-state relay modulates the heating element. This crate holds
//! temperature at a commanded setpoint, never drives the heater under
//! conditions that risk fire or boiler damage, recovers from sensor
//! faults, and exposes a minimal command/telemetry surface for a thin
//! operator UI to consume.
//!
//! The HTTP/WebSocket server, dashboard, TLS termination, and GPIO/I2C
//! drivers themselves are external collaborators; this crate defines the
//! contracts they're expected to satisfy (`Sensor`, `Actuator`,
//! `TelemetrySink`) and the control logic that sits between them.

pub mod actuator;
pub mod classifier;
pub mod command;
pub mod config;
pub mod constants;
pub mod control_loop;
pub mod errors;
pub mod events;
pub mod mode;
pub mod pid_engine;
pub mod recovery;
pub mod sensor;
pub mod simulate;
pub mod supervisor;
pub mod telemetry;
