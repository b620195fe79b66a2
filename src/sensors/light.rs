//! Ambient light sensing for the status report.
//!
//! The pilot mostly wants to know "did I leave the hangar lights on", so
//! the lux value is reduced to a coarse classification.

use std::fmt;
use std::path::PathBuf;

use crate::config::SystemConfig;
use crate::error::SensorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightLevel {
    Dark,
    Dim,
    Lit,
    Bright,
}

impl fmt::Display for LightLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LightLevel::Dark => "dark",
            LightLevel::Dim => "dimly lit",
            LightLevel::Lit => "lit",
            LightLevel::Bright => "brightly lit",
        };
        f.write_str(s)
    }
}

/// Classify a lux reading against the configured hangar cutoffs.
pub fn classify_lux(lux: u32, config: &SystemConfig) -> LightLevel {
    if lux <= config.hangar_dark_lux {
        LightLevel::Dark
    } else if lux <= config.hangar_dim_lux {
        LightLevel::Dim
    } else if lux <= config.hangar_lit_lux {
        LightLevel::Lit
    } else {
        LightLevel::Bright
    }
}

/// Lux readout via the kernel IIO illuminance file.
pub struct LightSensor {
    lux_path: PathBuf,
    enabled: bool,
}

impl LightSensor {
    pub fn new(path: &str, enabled: bool) -> Self {
        Self {
            lux_path: PathBuf::from(path),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn read_lux(&self) -> Result<u32, SensorError> {
        if !self.enabled {
            return Err(SensorError::NotEnabled);
        }
        let raw = std::fs::read_to_string(&self.lux_path)
            .map_err(|e| SensorError::Unavailable(e.to_string()))?;
        // Some drivers report fractional lux; round rather than reject.
        raw.trim()
            .parse::<f64>()
            .map(|lux| lux.round().max(0.0) as u32)
            .map_err(|e| SensorError::Unavailable(format!("bad lux value: {e}")))
    }
}
