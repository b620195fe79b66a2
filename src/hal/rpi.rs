//! Raspberry Pi adapters: serial modem port, sysfs GPIO, systemd control.
//!
//! The GPIO adapters go through the kernel's sysfs interface directly; the
//! pin is exported and configured once at construction, and every read/write
//! is an ordinary file operation so failures surface as typed errors rather
//! than panics.

use std::io::Read;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use log::{info, warn};

use crate::error::{ModemError, RelayError, SensorError};
use crate::hal::{GasProbe, InputPin, RelayIo, SerialIo, SystemControl};

// ───────────────────────────────────────────────────────────────
// Serial modem port
// ───────────────────────────────────────────────────────────────

/// Per-read timeout on the device handle. Bounded waits are enforced by the
/// engine's response window; this only caps a single drain call.
const PORT_READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Real serial device behind [`SerialIo`].
pub struct ModemPort {
    port: Box<dyn serialport::SerialPort>,
}

impl ModemPort {
    /// Open the device once. Retry policy lives in the engine, not here.
    pub fn open(path: &str, baud: u32) -> Result<Self, ModemError> {
        let port = serialport::new(path, baud)
            .timeout(PORT_READ_TIMEOUT)
            .open()
            .map_err(|e| ModemError::Io(format!("{path}: {e}")))?;
        info!("serial port {path} open at {baud} baud");
        Ok(Self { port })
    }
}

impl SerialIo for ModemPort {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ModemError> {
        std::io::Write::write_all(&mut self.port, bytes)
            .and_then(|()| std::io::Write::flush(&mut self.port))
            .map_err(|e| ModemError::Io(e.to_string()))
    }

    fn bytes_waiting(&mut self) -> Result<usize, ModemError> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| ModemError::Io(e.to_string()))
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, ModemError> {
        let waiting = self.bytes_waiting()?;
        if waiting == 0 {
            return Ok(0);
        }
        let mut chunk = vec![0u8; waiting];
        match self.port.read(&mut chunk) {
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(ModemError::Io(e.to_string())),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Sysfs GPIO
// ───────────────────────────────────────────────────────────────

const GPIO_ROOT: &str = "/sys/class/gpio";

fn export_pin(pin: u32, direction: &str) -> std::io::Result<PathBuf> {
    let pin_dir = PathBuf::from(format!("{GPIO_ROOT}/gpio{pin}"));
    if !pin_dir.exists() {
        std::fs::write(format!("{GPIO_ROOT}/export"), pin.to_string())?;
    }
    std::fs::write(pin_dir.join("direction"), direction)?;
    Ok(pin_dir.join("value"))
}

/// Heater relay on a sysfs GPIO output pin.
pub struct SysfsRelay {
    value_path: PathBuf,
}

impl SysfsRelay {
    pub fn new(pin: u32) -> Result<Self, RelayError> {
        let value_path =
            export_pin(pin, "out").map_err(|e| RelayError::GpioWrite(e.to_string()))?;
        info!("relay on GPIO{pin} exported");
        Ok(Self { value_path })
    }

    fn write_level(&mut self, high: bool) -> Result<(), RelayError> {
        std::fs::write(&self.value_path, if high { "1" } else { "0" })
            .map_err(|e| RelayError::GpioWrite(e.to_string()))
    }
}

impl RelayIo for SysfsRelay {
    fn set_high(&mut self) -> Result<(), RelayError> {
        self.write_level(true)
    }

    fn set_low(&mut self) -> Result<(), RelayError> {
        self.write_level(false)
    }

    fn is_high(&mut self) -> Result<bool, RelayError> {
        let raw = std::fs::read_to_string(&self.value_path)
            .map_err(|e| RelayError::GpioRead(e.to_string()))?;
        Ok(raw.trim() == "1")
    }
}

/// Digital input pin (ring indicator) through sysfs.
pub struct SysfsInput {
    value_path: PathBuf,
}

impl SysfsInput {
    pub fn new(pin: u32) -> Result<Self, SensorError> {
        let value_path =
            export_pin(pin, "in").map_err(|e| SensorError::Unavailable(e.to_string()))?;
        Ok(Self { value_path })
    }
}

impl InputPin for SysfsInput {
    fn is_high(&mut self) -> Result<bool, SensorError> {
        let raw = std::fs::read_to_string(&self.value_path)
            .map_err(|e| SensorError::Unavailable(e.to_string()))?;
        Ok(raw.trim() == "1")
    }
}

// ───────────────────────────────────────────────────────────────
// Gas probe via IIO ADC
// ───────────────────────────────────────────────────────────────

/// MQ-2 style analog gas probe read through the kernel IIO ADC interface.
pub struct IioGasProbe {
    raw_path: PathBuf,
}

impl IioGasProbe {
    /// `path` is the `in_voltageN_raw` file of the ADC channel the probe
    /// is wired to.
    pub fn new(path: &str) -> Self {
        Self {
            raw_path: PathBuf::from(path),
        }
    }
}

impl GasProbe for IioGasProbe {
    fn read_level(&mut self) -> Result<u32, SensorError> {
        let raw = std::fs::read_to_string(&self.raw_path)
            .map_err(|e| SensorError::Unavailable(e.to_string()))?;
        raw.trim()
            .parse::<u32>()
            .map_err(|e| SensorError::Unavailable(format!("bad ADC value: {e}")))
    }
}

// ───────────────────────────────────────────────────────────────
// System control
// ───────────────────────────────────────────────────────────────

/// Restart / shutdown through the `shutdown(8)` command.
pub struct OsControl;

impl SystemControl for OsControl {
    fn restart(&mut self) {
        info!("issuing OS restart");
        if let Err(e) = Command::new("shutdown").args(["-r", "now"]).status() {
            warn!("restart command failed: {e}");
        }
    }

    fn shutdown(&mut self) {
        info!("issuing OS shutdown");
        if let Err(e) = Command::new("shutdown").args(["-h", "now"]).status() {
            warn!("shutdown command failed: {e}");
        }
    }
}
