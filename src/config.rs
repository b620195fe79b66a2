//! System configuration parameters
//!
//! All tunable parameters for the hangarwarmer unit. Values come from a TOML
//! file on disk (`/etc/hangarwarmer.toml` by default); anything missing falls
//! back to the defaults below. The core components receive this struct
//! read-only at construction time and never re-read the file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hangarwarmer.toml";

/// Core system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Modem ---
    /// Serial device the GSM modem is attached to.
    pub serial_port: String,
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Connection attempts before startup is declared failed.
    pub connect_retries: u32,
    /// Seconds to sleep between connection attempts.
    pub connect_backoff_secs: u64,
    /// Think-time delay after writing a command, before draining the reply.
    pub modem_think_time_secs: u64,
    /// Window to wait for any response bytes after a write.
    pub modem_response_window_secs: u64,
    /// Ring-indicator GPIO pin (BCM numbering), if wired.
    pub ring_indicator_pin: Option<u32>,
    /// Seconds between "poll for messages" ticks.
    pub message_poll_secs: u64,
    /// Retries for a failed outbound SMS before it is dropped.
    pub send_retries: u32,
    /// Run without modem hardware: scripted/no-device serial, for bench use.
    pub test_mode: bool,

    // --- Heater ---
    /// Relay GPIO pin (BCM numbering).
    pub heater_pin: u32,
    /// Mandatory maximum run time; the relay is forced off after this.
    pub max_run_minutes: u64,

    // --- Command surface ---
    /// Phone numbers allowed to command the unit (digits only, normalized).
    pub allowed_phone_numbers: Vec<String>,
    /// Longest SMS body accepted; anything over is rejected as garbage.
    pub max_message_len: usize,
    /// Shortest sender number accepted after normalization.
    pub min_phone_digits: usize,

    // --- Gas sensor ---
    pub gas_sensor_enabled: bool,
    /// IIO ADC channel file (`in_voltageN_raw`) the probe is wired to.
    pub gas_adc_path: String,
    /// Raw reading at or above which gas is considered detected.
    pub gas_trigger_level: u32,
    /// Raw reading at or below which a detection clears (must be < trigger).
    pub gas_all_clear_level: u32,
    /// Seconds between gas samples.
    pub gas_sample_secs: u64,

    // --- Temperature probe ---
    pub temp_probe_enabled: bool,
    /// 1-Wire slave file of the DS18B20 probe.
    pub temp_probe_path: String,

    // --- Light sensor ---
    pub light_sensor_enabled: bool,
    /// IIO illuminance file (`in_illuminance_input`) of the light sensor.
    pub light_sensor_path: String,
    /// Lux at or below which the hangar is "dark".
    pub hangar_dark_lux: u32,
    /// Lux at or below which the hangar is "dim".
    pub hangar_dim_lux: u32,
    /// Lux at or below which the hangar is "lit" (above is "bright").
    pub hangar_lit_lux: u32,

    // --- Modem health ---
    /// Battery percent at or below which the unit broadcasts an alert.
    pub battery_critical_percent: u32,
    /// Battery percent at or below which a warning is logged.
    pub battery_warning_percent: u32,
    /// Seconds between battery / signal refreshes.
    pub health_check_secs: u64,
    /// RSSI classification cutoffs, ascending.
    pub signal_thresholds: SignalThresholds,

    // --- Loop timing ---
    /// Decision-loop cadence in milliseconds.
    pub loop_interval_ms: u64,

    // --- Logging ---
    /// Log file path; empty means stderr only.
    pub log_file: String,
}

/// RSSI cutoffs for the human-readable signal classification.
/// A reading of 0 is "None"; otherwise the first bucket whose upper bound
/// is not exceeded wins, and anything above `good_max` is "Excellent".
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalThresholds {
    pub poor_max: u32,
    pub marginal_max: u32,
    pub ok_max: u32,
    pub good_max: u32,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            poor_max: 4,
            marginal_max: 9,
            ok_max: 14,
            good_max: 19,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Modem
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            connect_retries: 4,
            connect_backoff_secs: 10,
            modem_think_time_secs: 2,
            modem_response_window_secs: 5,
            ring_indicator_pin: Some(24),
            message_poll_secs: 60,
            send_retries: 4,
            test_mode: false,

            // Heater
            heater_pin: 17,
            max_run_minutes: 60,

            // Command surface
            allowed_phone_numbers: Vec::new(),
            max_message_len: 32,
            min_phone_digits: 7,

            // Gas sensor
            gas_sensor_enabled: true,
            gas_adc_path: "/sys/bus/iio/devices/iio:device0/in_voltage0_raw".to_string(),
            gas_trigger_level: 230,
            gas_all_clear_level: 220,
            gas_sample_secs: 30,

            // Temperature probe
            temp_probe_enabled: false,
            temp_probe_path: "/sys/bus/w1/devices/28-000000000000/w1_slave".to_string(),

            // Light sensor
            light_sensor_enabled: false,
            light_sensor_path: "/sys/bus/iio/devices/iio:device1/in_illuminance_input"
                .to_string(),
            hangar_dark_lux: 10,
            hangar_dim_lux: 50,
            hangar_lit_lux: 200,

            // Modem health
            battery_critical_percent: 40,
            battery_warning_percent: 60,
            health_check_secs: 300,
            signal_thresholds: SignalThresholds::default(),

            // Loop timing
            loop_interval_ms: 1000,

            // Logging
            log_file: String::new(),
        }
    }
}

impl SystemConfig {
    /// Load from a TOML file, falling back to defaults for missing keys.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| Error::Config(format!("bad TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would defeat the safety interlocks.
    pub fn validate(&self) -> Result<(), Error> {
        if self.gas_all_clear_level >= self.gas_trigger_level {
            return Err(Error::Config(
                "gas_all_clear_level must be below gas_trigger_level".to_string(),
            ));
        }
        if self.max_run_minutes == 0 {
            return Err(Error::Config("max_run_minutes must be non-zero".to_string()));
        }
        if self.connect_retries == 0 {
            return Err(Error::Config("connect_retries must be non-zero".to_string()));
        }
        if self.max_message_len == 0 {
            return Err(Error::Config("max_message_len must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = SystemConfig::default();
        assert!(c.validate().is_ok());
        assert!(c.gas_trigger_level > c.gas_all_clear_level);
        assert_eq!(c.max_run_minutes, 60);
        assert_eq!(c.max_message_len, 32);
        assert!(c.loop_interval_ms > 0);
    }

    #[test]
    fn hysteresis_gap_is_enforced() {
        let mut c = SystemConfig::default();
        c.gas_all_clear_level = c.gas_trigger_level;
        assert!(c.validate().is_err(), "equal thresholds would flap");
    }

    #[test]
    fn serde_roundtrip() {
        let c = SystemConfig::default();
        let text = toml::to_string(&c).unwrap();
        let c2: SystemConfig = toml::from_str(&text).unwrap();
        assert_eq!(c.gas_trigger_level, c2.gas_trigger_level);
        assert_eq!(c.serial_port, c2.serial_port);
        assert_eq!(c.signal_thresholds.good_max, c2.signal_thresholds.good_max);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: SystemConfig =
            toml::from_str("allowed_phone_numbers = [\"2061234567\"]\nmax_run_minutes = 30\n")
                .unwrap();
        assert_eq!(c.allowed_phone_numbers, vec!["2061234567".to_string()]);
        assert_eq!(c.max_run_minutes, 30);
        assert_eq!(c.baud_rate, 9600);
    }

    #[test]
    fn load_from_file() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "serial_port = \"/dev/ttyAMA0\"").unwrap();
        let c = SystemConfig::load(f.path()).unwrap();
        assert_eq!(c.serial_port, "/dev/ttyAMA0");
    }
}
