//! Unified error types for the hangarwarmer unit.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! decision loop's error handling uniform. Hardware and protocol errors are
//! caught at the boundary of the component that owns the resource; nothing
//! here is fatal except modem connection exhaustion at startup, which `main`
//! handles through `anyhow`.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the unit funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The modem could not be reached or misbehaved.
    Modem(ModemError),
    /// A modem reply could not be parsed into the expected record.
    Parse(ParseError),
    /// A relay GPIO operation failed.
    Relay(RelayError),
    /// A sensor is disabled or its hardware is missing.
    Sensor(SensorError),
    /// Configuration is invalid or could not be loaded.
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Modem(e) => write!(f, "modem: {e}"),
            Self::Parse(e) => write!(f, "parse: {e}"),
            Self::Relay(e) => write!(f, "relay: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Modem errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemError {
    /// The serial device could not be opened after the configured retries.
    /// Fatal at startup: no modem means no purpose.
    ConnectExhausted { attempts: u32, last_error: String },
    /// No response arrived within the command's response window.
    Timeout { command: String },
    /// The serial device returned an I/O error mid-exchange.
    Io(String),
    /// The engine is running without hardware (debug / test mode).
    NoDevice,
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectExhausted {
                attempts,
                last_error,
            } => write!(f, "connect failed after {attempts} attempts: {last_error}"),
            Self::Timeout { command } => write!(f, "no response to {command}"),
            Self::Io(msg) => write!(f, "serial I/O: {msg}"),
            Self::NoDevice => write!(f, "no modem device"),
        }
    }
}

impl std::error::Error for ModemError {}

impl From<ModemError> for Error {
    fn from(e: ModemError) -> Self {
        Self::Modem(e)
    }
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// A modem reply record did not have the expected shape. The record is
/// dropped by the caller; the batch it came from is not failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Which record kind failed (`"CMGL header"`, `"CBC reply"`, ...).
    pub what: &'static str,
    /// The offending input, for the log.
    pub input: String,
}

impl ParseError {
    pub fn new(what: &'static str, input: &str) -> Self {
        Self {
            what,
            input: input.to_string(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed {}: {:?}", self.what, self.input)
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

// ---------------------------------------------------------------------------
// Relay errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Writing the relay pin failed. In-memory state may now disagree with
    /// hardware; the controller's tick reconciliation is the recovery path.
    GpioWrite(String),
    /// Reading the relay pin back failed.
    GpioRead(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpioWrite(msg) => write!(f, "GPIO write failed: {msg}"),
            Self::GpioRead(msg) => write!(f, "GPIO read failed: {msg}"),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<RelayError> for Error {
    fn from(e: RelayError) -> Self {
        Self::Relay(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// The sensor is disabled in configuration.
    NotEnabled,
    /// The sensor hardware could not be read.
    Unavailable(String),
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotEnabled => write!(f, "not enabled"),
            Self::Unavailable(msg) => write!(f, "unavailable: {msg}"),
        }
    }
}

impl std::error::Error for SensorError {}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
