//! The orchestrator — single-threaded owner of every decision.
//!
//! Producer threads only ever push typed events; nothing else in the
//! process commands the heater or the modem. Each cycle runs a fixed
//! order: gas edges first (safety), then the heater's shutoff checks, then
//! inbound SMS, then the periodic health refresh, then outbound delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use log::{error, info, warn};

use crate::app::events::GasEvent;
use crate::config::SystemConfig;
use crate::dispatch::{
    self, arbitrate_heater, format_duration, help_text, render_status, Command, DispatchOutcome,
    HeaterAction, StatusSnapshot,
};
use crate::hal::{RelayIo, SerialIo, SystemControl};
use crate::heater::{HeaterController, HeaterEvent};
use crate::modem::engine::ModemEngine;
use crate::modem::mailbox::fetch_worklist;
use crate::modem::wire::{BatteryCondition, SignalStrength};
use crate::sensors::gas::{GasReading, GasSamplerHandle};
use crate::sensors::light::{classify_lux, LightSensor};
use crate::sensors::temperature::TemperatureProbe;

pub struct Orchestrator<S: SerialIo, R: RelayIo, C: SystemControl> {
    config: SystemConfig,
    engine: Arc<ModemEngine<S>>,
    heater: HeaterController<R>,
    control: C,
    gas_events: Receiver<GasEvent>,
    gas_sampler: Option<GasSamplerHandle>,
    temperature: TemperatureProbe,
    light: LightSensor,
    battery: BatteryCondition,
    signal: SignalStrength,
    next_health_check: Instant,
    battery_warned: bool,
    started_at: Instant,
}

impl<S: SerialIo, R: RelayIo, C: SystemControl> Orchestrator<S, R, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SystemConfig,
        engine: Arc<ModemEngine<S>>,
        heater: HeaterController<R>,
        control: C,
        gas_events: Receiver<GasEvent>,
        gas_sampler: Option<GasSamplerHandle>,
        temperature: TemperatureProbe,
        light: LightSensor,
    ) -> Self {
        Self {
            config,
            engine,
            heater,
            control,
            gas_events,
            gas_sampler,
            temperature,
            light,
            battery: BatteryCondition::unknown(),
            signal: SignalStrength {
                rssi: 0,
                bit_error_rate: 0,
            },
            next_health_check: Instant::now(),
            battery_warned: false,
            started_at: Instant::now(),
        }
    }

    /// One-time startup: clear stale commands off the SIM, take the first
    /// health reading, and tell the owners the unit is up.
    pub fn startup(&mut self) {
        match self.engine.delete_all_messages() {
            Ok(n) if n > 0 => {
                info!("cleared {n} stale messages from SIM");
                self.broadcast(&format!("Cleared {n} stale messages from the SIM."));
            }
            Ok(_) => {}
            Err(e) => warn!("SIM cleanup failed: {e}"),
        }

        self.refresh_health(Instant::now());

        self.broadcast(&format!("Hangar warmer online. {}", help_text()));
        let status = render_status(&self.snapshot(Instant::now()));
        self.broadcast(&status);
        self.engine.flush_outbound();
    }

    /// Run the decision loop until `stop` is raised.
    pub fn run(&mut self, stop: &AtomicBool) {
        let interval = Duration::from_millis(self.config.loop_interval_ms);
        while !stop.load(Ordering::SeqCst) {
            self.tick(Instant::now());
            std::thread::sleep(interval);
        }
        info!("decision loop stopped");
    }

    /// One decision cycle. Public so the integration tests can drive time
    /// explicitly.
    pub fn tick(&mut self, now: Instant) {
        self.handle_gas_events(now);
        self.run_heater_checks(now);
        self.handle_inbound_sms(now);
        self.refresh_health(now);
        self.engine.flush_outbound();
    }

    // ── Gas ───────────────────────────────────────────────────

    fn handle_gas_events(&mut self, _now: Instant) {
        while let Ok(event) = self.gas_events.try_recv() {
            match event {
                GasEvent::Detected { level } => {
                    error!("gas detected (level {level})");
                    let heater_was_on = match self.heater.turn_off() {
                        Ok(was_on) => was_on,
                        Err(e) => {
                            error!("emergency heater shutoff failed: {e}");
                            false
                        }
                    };
                    let mut alert = format!("WARNING: gas detected in hangar (level {level}).");
                    if heater_was_on {
                        alert.push_str(" Heater has been turned OFF.");
                    }
                    self.broadcast(&alert);
                }
                GasEvent::Cleared { level } => {
                    info!("gas cleared (level {level})");
                    self.broadcast(&format!("Gas level back to normal (level {level})."));
                }
            }
        }
    }

    fn gas_reading(&self) -> GasReading {
        self.gas_sampler
            .as_ref()
            .map_or_else(GasReading::startup, GasSamplerHandle::reading)
    }

    // ── Heater safety ─────────────────────────────────────────

    fn run_heater_checks(&mut self, now: Instant) {
        match self.heater.tick(now) {
            Ok(Some(HeaterEvent::MaxTimeShutoff { ran_for })) => {
                self.broadcast(&format!(
                    "Heater turned OFF after maximum run of {}.",
                    format_duration(ran_for)
                ));
            }
            Ok(Some(HeaterEvent::ReconciledOff)) => {
                self.broadcast("Heater relay was found ON unexpectedly and has been turned OFF.");
            }
            Ok(None) => {}
            Err(e) => error!("heater safety check failed: {e}"),
        }
    }

    // ── Inbound SMS ───────────────────────────────────────────

    fn handle_inbound_sms(&mut self, now: Instant) {
        if !self.engine.is_message_waiting() {
            return;
        }
        for msg in fetch_worklist(&self.engine) {
            match dispatch::dispatch(&msg, &self.config) {
                DispatchOutcome::Act { command, reply_to } => {
                    self.execute(command, &reply_to, now);
                }
                DispatchOutcome::Unknown { reply_to } => {
                    self.engine.queue_sms(&reply_to, help_text());
                }
                DispatchOutcome::Invalid { reply_to, reason } => {
                    self.engine.queue_sms(&reply_to, &reason);
                }
                DispatchOutcome::Alert { text } => self.broadcast(&text),
            }
        }
    }

    fn execute(&mut self, command: Command, reply_to: &str, now: Instant) {
        match command {
            Command::TurnOn | Command::TurnOff => {
                let (action, reply) = arbitrate_heater(
                    command == Command::TurnOn,
                    self.heater.is_on(),
                    self.heater.remaining(now),
                    self.gas_reading().detected,
                    Duration::from_secs(self.config.max_run_minutes * 60),
                );
                match action {
                    HeaterAction::Ignore => self.engine.queue_sms(reply_to, &reply),
                    HeaterAction::Energize => match self.heater.turn_on(now) {
                        Ok(_) => self.engine.queue_sms(reply_to, &reply),
                        Err(e) => {
                            error!("heater relay failure on ON command: {e}");
                            self.engine
                                .queue_sms(reply_to, "Heater relay failure. Heater is NOT on.");
                        }
                    },
                    HeaterAction::Deenergize => match self.heater.turn_off() {
                        Ok(_) => self.engine.queue_sms(reply_to, &reply),
                        Err(e) => {
                            error!("heater relay failure on OFF command: {e}");
                            self.engine.queue_sms(
                                reply_to,
                                "Heater relay failure. Heater may still be ON.",
                            );
                        }
                    },
                }
            }
            Command::Status => {
                let status = render_status(&self.snapshot(now));
                self.engine.queue_sms(reply_to, &status);
            }
            Command::Help => self.engine.queue_sms(reply_to, help_text()),
            Command::Restart => {
                info!("restart requested by {reply_to}");
                self.engine.queue_sms(reply_to, "Unit is restarting.");
                self.engine.flush_outbound();
                self.control.restart();
            }
            Command::Shutdown => {
                info!("shutdown requested by {reply_to}");
                self.engine.queue_sms(reply_to, "Unit is shutting down.");
                self.engine.flush_outbound();
                self.control.shutdown();
            }
        }
    }

    // ── Health ────────────────────────────────────────────────

    fn refresh_health(&mut self, now: Instant) {
        if now < self.next_health_check {
            return;
        }
        self.next_health_check = now + Duration::from_secs(self.config.health_check_secs);

        self.battery = self.engine.battery_condition();
        self.signal = self.engine.signal_strength();

        if self.battery.known {
            if !self.battery.is_ok(self.config.battery_critical_percent) {
                if !self.battery_warned {
                    self.battery_warned = true;
                    self.broadcast(&format!(
                        "Unit battery is critically low: {}%.",
                        self.battery.charge_percent
                    ));
                }
            } else {
                if self.battery.charge_percent <= self.config.battery_warning_percent {
                    warn!("battery at {}%", self.battery.charge_percent);
                }
                self.battery_warned = false;
            }
        }
    }

    // ── Shared helpers ────────────────────────────────────────

    fn snapshot(&self, now: Instant) -> StatusSnapshot {
        let temperature_f = self.temperature.read_fahrenheit().ok();
        let light = self
            .light
            .read_lux()
            .ok()
            .map(|lux| classify_lux(lux, &self.config));

        StatusSnapshot {
            heater_on: self.heater.is_on(),
            time_remaining: self.heater.remaining(now),
            gas_enabled: self.config.gas_sensor_enabled,
            gas: self.gas_reading(),
            temperature_f,
            light,
            battery: self.battery,
            signal: self.signal.classify(&self.config.signal_thresholds),
            uptime: now.saturating_duration_since(self.started_at),
        }
    }

    /// Queue `text` to every number on the allow-list.
    fn broadcast(&self, text: &str) {
        for number in &self.config.allowed_phone_numbers {
            self.engine.queue_sms(number, text);
        }
    }

    /// Stop the sampler thread; used on orderly shutdown.
    pub fn shutdown_sensors(&mut self) {
        if let Some(sampler) = self.gas_sampler.take() {
            sampler.stop();
        }
    }
}
