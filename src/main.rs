//! Hangar warmer — main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Adapters (outer ring)                  │
//! │                                                          │
//! │  ModemPort      SysfsRelay    IioGasProbe   OsControl    │
//! │  (SerialIo)     (RelayIo)     (GasProbe)    (SystemCtl)  │
//! │                                                          │
//! │  ───────────────── Port trait boundary ────────────────  │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │            Orchestrator (pure decisions)           │  │
//! │  │  gas edges · heater shutoff · SMS dispatch         │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │                                                          │
//! │  gas sampler thread · RI watcher · poll ticker           │
//! └──────────────────────────────────────────────────────────┘
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use hangarwarmer::app::Orchestrator;
use hangarwarmer::config::{SystemConfig, DEFAULT_CONFIG_PATH};
use hangarwarmer::hal::rpi::{IioGasProbe, ModemPort, OsControl, SysfsInput, SysfsRelay};
use hangarwarmer::hal::sim::NoDeviceSerial;
use hangarwarmer::hal::SerialIo;
use hangarwarmer::heater::HeaterController;
use hangarwarmer::modem::engine::{self, ModemEngine, ModemTiming};
use hangarwarmer::sensors::gas::{spawn_gas_sampler, GasMonitor};
use hangarwarmer::sensors::light::LightSensor;
use hangarwarmer::sensors::temperature::TemperatureProbe;

fn main() -> Result<()> {
    let config = load_config()?;
    init_logging(&config)?;

    info!("hangarwarmer v{} starting", env!("CARGO_PKG_VERSION"));
    if config.allowed_phone_numbers.is_empty() {
        warn!("no allowed_phone_numbers configured; nobody can command this unit");
    }

    if config.test_mode {
        warn!("test mode: running without modem hardware");
        run(config, NoDeviceSerial)
    } else {
        let serial = engine::connect(
            || ModemPort::open(&config.serial_port, config.baud_rate),
            config.connect_retries,
            Duration::from_secs(config.connect_backoff_secs),
        )
        .context("modem connection failed")?;
        run(config, serial)
    }
}

fn load_config() -> Result<SystemConfig> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    if Path::new(&path).exists() {
        let config = SystemConfig::load(Path::new(&path))
            .with_context(|| format!("loading config from {path}"))?;
        Ok(config)
    } else {
        eprintln!("config file {path} not found, using defaults");
        Ok(SystemConfig::default())
    }
}

fn init_logging(config: &SystemConfig) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    );
    if !config.log_file.is_empty() {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_file)
            .with_context(|| format!("opening log file {}", config.log_file))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn run(config: SystemConfig, serial: impl SerialIo + 'static) -> Result<()> {
    // ── Modem engine + message-waiting producers ──────────────
    let (wait_tx, wait_rx) = crossbeam_channel::unbounded();
    let engine = Arc::new(ModemEngine::new(
        serial,
        ModemTiming::from_config(&config),
        config.send_retries,
        wait_rx,
    ));
    engine.initialize();

    let ring_indicator = config.ring_indicator_pin.and_then(|pin| {
        SysfsInput::new(pin)
            .map_err(|e| warn!("ring indicator on GPIO{pin} unavailable: {e}"))
            .ok()
    });
    let wait_sources = engine::spawn_waiting_sources(
        &wait_tx,
        ring_indicator,
        Duration::from_secs(config.message_poll_secs),
    );

    // ── Gas sampler ───────────────────────────────────────────
    let (gas_tx, gas_rx) = crossbeam_channel::unbounded();
    let gas_sampler = if config.gas_sensor_enabled {
        Some(spawn_gas_sampler(
            IioGasProbe::new(&config.gas_adc_path),
            GasMonitor::new(config.gas_trigger_level, config.gas_all_clear_level),
            Duration::from_secs(config.gas_sample_secs),
            &gas_tx,
        ))
    } else {
        warn!("gas sensor disabled by configuration");
        None
    };

    // ── Heater ────────────────────────────────────────────────
    let relay = SysfsRelay::new(config.heater_pin).context("heater relay init failed")?;
    let heater = HeaterController::new(relay, Duration::from_secs(config.max_run_minutes * 60))
        .context("heater relay could not be driven low at startup")?;

    // ── Auxiliary sensors ─────────────────────────────────────
    let temperature = TemperatureProbe::new(&config.temp_probe_path, config.temp_probe_enabled);
    let light = LightSensor::new(&config.light_sensor_path, config.light_sensor_enabled);

    // ── Orchestrator ──────────────────────────────────────────
    let mut orchestrator = Orchestrator::new(
        config,
        engine,
        heater,
        OsControl,
        gas_rx,
        gas_sampler,
        temperature,
        light,
    );

    orchestrator.startup();
    info!("unit online, entering decision loop");

    static STOP: AtomicBool = AtomicBool::new(false);
    ctrlc::set_handler(|| {
        info!("termination signal received, stopping decision loop");
        STOP.store(true, Ordering::SeqCst);
    })
    .context("installing signal handler")?;

    orchestrator.run(&STOP);
    orchestrator.shutdown_sensors();
    wait_sources.stop();
    info!("shutdown complete");
    Ok(())
}
