//! # Boiler Control Core
//!
//! Entry point for the standalone control process. Two subcommands:
//! `run` wires the real Sensor/Actuator drivers and drives the Control
//! Loop at 1 Hz until a shutdown signal arrives; `simulate` drives the
//! same loop against an in-process thermal model for bench testing
//! without hardware.
//!
//! ## Concurrency
//!
//! The Control Loop tick, the configuration reload poll, the retention
//! sweep, and the steam watchdog all run as independent `tokio` tasks.
//! Only the Control Loop ever writes the Actuator in steady state; the
//! shutdown handler is the one exception, and it runs after the tick
//! tasks have been told to stop.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use control_core::actuator::{Actuator, GpioActuator};
use control_core::command::CommandInterface;
use control_core::config::ConfigStore;
use control_core::constants::{CONFIG_RELOAD_INTERVAL, RETENTION_SWEEP_INTERVAL, TICK_PERIOD};
use control_core::control_loop::ControlLoop;
use control_core::events::EventBus;
use control_core::mode::ModeController;
use control_core::sensor::ProcessSensor;
use control_core::telemetry::{InMemorySink, TelemetryStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// A standalone control process for a single-boiler espresso machine.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the control core against real sensor and actuator drivers.
    Run(RunArgs),
    /// Run the control core against an in-process thermal model.
    Simulate(SimulateArgs),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the configuration document.
    #[arg(short, long, default_value = "boiler.json")]
    config_path: PathBuf,

    /// Path to the sensor driver binary invoked once per tick.
    #[arg(long, default_value = "/usr/local/bin/mcp9600-read")]
    sensor_driver: String,

    /// Address of the GPIO PWM daemon socket.
    #[arg(long, default_value = "/run/boiler-gpio.sock")]
    actuator_endpoint: String,
}

/// Arguments for the `simulate` command.
#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Path to the configuration document used for setpoint and gains.
    #[arg(short, long, default_value = "boiler.json")]
    config_path: PathBuf,

    /// Number of 1 Hz ticks to simulate.
    #[arg(long, default_value_t = 600)]
    ticks: u32,

    /// Log a status line every N ticks.
    #[arg(long, default_value_t = 30)]
    print_every: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_core(args).await,
        Commands::Simulate(args) => {
            control_core::simulate::run_cold_start(args.config_path, args.ticks, args.print_every.max(1)).await
        }
    }
}

async fn run_core(args: RunArgs) -> Result<()> {
    info!("Starting boiler control core...");

    let config = Arc::new(ConfigStore::load(&args.config_path)?);
    let events = Arc::new(EventBus::new());
    let mode = Arc::new(ModeController::new(config.clone(), events.clone()));
    let sensor = Arc::new(ProcessSensor::new(args.sensor_driver));
    let actuator = Arc::new(GpioActuator::new(args.actuator_endpoint));
    let telemetry = Arc::new(TelemetryStore::new(InMemorySink::new()));
    let control_loop = Arc::new(ControlLoop::new(
        sensor,
        actuator.clone(),
        config.clone(),
        mode.clone(),
        events.clone(),
        telemetry.clone(),
    ));
    let _command_interface = CommandInterface::new(config.clone(), mode, telemetry.clone());

    // 1 Hz Control Loop tick. Each tick runs as its own spawned task so a
    // panic inside one tick surfaces as a `JoinError` here rather than
    // silently killing the outer loop without running the shutdown handler
    // (spec §7 "uncaught panics anywhere invoke the shutdown handler").
    // `ControlLoop::tick`'s own re-entrance guard (`try_lock`) means
    // spawning per-tick is safe even if one tick overruns the interval.
    let tick_loop = control_loop.clone();
    let tick_actuator = actuator.clone();
    let tick_telemetry = telemetry.clone();
    let tick_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_PERIOD);
        loop {
            interval.tick().await;
            let loop_ref = tick_loop.clone();
            if let Err(e) = tokio::spawn(async move { loop_ref.tick().await }).await {
                if e.is_panic() {
                    tracing::error!("control loop tick panicked, running shutdown handler");
                    tick_actuator.off().await;
                    tick_telemetry.flush();
                    break;
                }
            }
        }
    });

    // Configuration hot-reload poll (spec §4.9).
    let reload_config = config.clone();
    let reload_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(CONFIG_RELOAD_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = reload_config.reload() {
                tracing::warn!(error = %e, "configuration reload failed");
            }
        }
    });

    // Hourly telemetry retention sweep (spec §4.8).
    let sweep_telemetry = telemetry.clone();
    let sweep_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let now_millis = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            sweep_telemetry.prune_expired(now_millis);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping control core");

    tick_task.abort();
    reload_task.abort();
    sweep_task.abort();

    actuator.off().await;
    telemetry.flush();

    Ok(())
}
