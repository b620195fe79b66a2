//! Port traits — the boundary between the decision logic and the hardware.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ core (engine / controller / monitor)
//! ```
//!
//! Real adapters live in [`rpi`]; in-memory fakes for tests and bench mode
//! live in [`sim`]. The core consumes the traits via generics, so nothing in
//! the decision path touches a device file directly, and there is no
//! process-wide mutable hardware state anywhere.

pub mod rpi;
pub mod sim;

use crate::error::{ModemError, RelayError, SensorError};

// ───────────────────────────────────────────────────────────────
// Serial port (modem transport)
// ───────────────────────────────────────────────────────────────

/// Raw byte I/O over the modem's serial link with bounded-time reads.
///
/// The engine owns one of these exclusively and serializes every exchange;
/// implementations only need to be honest about what is in the receive
/// buffer, never to block beyond their configured timeout.
pub trait SerialIo: Send {
    /// Write the whole buffer to the device.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ModemError>;

    /// Number of bytes sitting in the receive buffer right now.
    fn bytes_waiting(&mut self) -> Result<usize, ModemError>;

    /// Drain whatever is currently readable into `buf`.
    /// Returns the number of bytes appended; never blocks past the
    /// device's own read timeout.
    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, ModemError>;
}

// ───────────────────────────────────────────────────────────────
// Relay (heater power)
// ───────────────────────────────────────────────────────────────

/// The heater power relay. Exclusively owned by the heater controller,
/// which is itself only driven from the orchestrator thread.
pub trait RelayIo: Send {
    fn set_high(&mut self) -> Result<(), RelayError>;
    fn set_low(&mut self) -> Result<(), RelayError>;

    /// Read the electrical state of the pin back from the hardware.
    fn is_high(&mut self) -> Result<bool, RelayError>;
}

// ───────────────────────────────────────────────────────────────
// Gas probe
// ───────────────────────────────────────────────────────────────

/// Raw gas-concentration readout. The sampler thread owns one of these;
/// everyone else sees only the published [`GasReading`](crate::sensors::gas::GasReading).
pub trait GasProbe: Send {
    fn read_level(&mut self) -> Result<u32, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Digital input (ring-indicator pin)
// ───────────────────────────────────────────────────────────────

/// A single digital input pin, used by the ring-indicator watcher.
pub trait InputPin: Send {
    fn is_high(&mut self) -> Result<bool, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// System control (restart / shutdown)
// ───────────────────────────────────────────────────────────────

/// OS-level restart and shutdown. The core only decides *that* one of these
/// should happen; the adapter decides *how*.
pub trait SystemControl: Send {
    fn restart(&mut self);
    fn shutdown(&mut self);
}
