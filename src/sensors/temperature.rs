//! DS18B20 temperature probe via the kernel 1-Wire interface.
//!
//! The w1_slave file holds two lines: a scratchpad dump ending in a CRC
//! verdict (`crc=.. YES`), and a line whose `t=NNNNN` suffix is the
//! temperature in millidegrees Celsius. A failed CRC means the read is
//! garbage and is reported as unavailable rather than as a wrong number.

use std::path::PathBuf;

use crate::error::SensorError;

pub struct TemperatureProbe {
    slave_path: PathBuf,
    enabled: bool,
}

impl TemperatureProbe {
    pub fn new(path: &str, enabled: bool) -> Self {
        Self {
            slave_path: PathBuf::from(path),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current temperature in Fahrenheit.
    pub fn read_fahrenheit(&self) -> Result<f64, SensorError> {
        if !self.enabled {
            return Err(SensorError::NotEnabled);
        }
        let raw = std::fs::read_to_string(&self.slave_path)
            .map_err(|e| SensorError::Unavailable(e.to_string()))?;
        parse_w1_slave(&raw)
    }
}

fn parse_w1_slave(raw: &str) -> Result<f64, SensorError> {
    let mut lines = raw.lines();
    let crc_line = lines
        .next()
        .ok_or_else(|| SensorError::Unavailable("empty w1_slave file".to_string()))?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(SensorError::Unavailable("CRC check failed".to_string()));
    }
    let temp_line = lines
        .next()
        .ok_or_else(|| SensorError::Unavailable("missing temperature line".to_string()))?;
    let milli_c: f64 = temp_line
        .rsplit_once("t=")
        .and_then(|(_, t)| t.trim().parse().ok())
        .ok_or_else(|| SensorError::Unavailable("no t= field".to_string()))?;

    let celsius = milli_c / 1000.0;
    Ok(celsius * 9.0 / 5.0 + 32.0)
}
