//! In-memory hardware fakes.
//!
//! Used by the host test suite and by `test_mode` runs on a bench with no
//! modem attached. Every fake is a thin shell over shared atomics or a
//! mutex-guarded buffer, so a test (or a producer thread) can hold a clone
//! while the component under test owns the other.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{ModemError, RelayError, SensorError};
use crate::hal::{GasProbe, InputPin, RelayIo, SerialIo, SystemControl};

// ───────────────────────────────────────────────────────────────
// Scripted serial
// ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct SerialState {
    /// Reply chunks, one per command exchange, armed in order.
    replies: VecDeque<Vec<u8>>,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

/// Request/response serial fake. Each [`SerialScript::enqueue`] call scripts
/// the reply to exactly one command exchange; a chunk only becomes readable
/// once the device-under-test finishes writing a command (terminator, bare
/// CR, or the SMS SUB byte), the way a real modem only answers after being
/// asked.
pub struct ScriptedSerial {
    state: Arc<Mutex<SerialState>>,
}

/// Test-side handle onto a [`ScriptedSerial`].
#[derive(Clone)]
pub struct SerialScript {
    state: Arc<Mutex<SerialState>>,
}

impl ScriptedSerial {
    pub fn new() -> (Self, SerialScript) {
        let state = Arc::new(Mutex::new(SerialState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            SerialScript { state },
        )
    }
}

impl SerialScript {
    /// Script the reply to the next command exchange.
    pub fn enqueue(&self, text: &str) {
        let mut st = self.state.lock().unwrap();
        st.replies.push_back(text.bytes().collect());
    }

    /// Everything the engine has written so far, lossily decoded.
    pub fn written_text(&self) -> String {
        let st = self.state.lock().unwrap();
        String::from_utf8_lossy(&st.tx).into_owned()
    }

    pub fn clear_written(&self) {
        self.state.lock().unwrap().tx.clear();
    }
}

impl SerialIo for ScriptedSerial {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ModemError> {
        let mut st = self.state.lock().unwrap();
        st.tx.extend_from_slice(bytes);
        // A command just completed: arm the next scripted reply.
        let completes_command =
            matches!(bytes.last(), Some(b'\r' | b'\n' | b' ' | 0x1A));
        if completes_command && st.rx.is_empty() {
            if let Some(reply) = st.replies.pop_front() {
                st.rx.extend(reply);
            }
        }
        Ok(())
    }

    fn bytes_waiting(&mut self) -> Result<usize, ModemError> {
        Ok(self.state.lock().unwrap().rx.len())
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, ModemError> {
        let mut st = self.state.lock().unwrap();
        let n = st.rx.len();
        buf.extend(st.rx.drain(..));
        Ok(n)
    }
}

// ───────────────────────────────────────────────────────────────
// No-device serial (debug / bench mode)
// ───────────────────────────────────────────────────────────────

/// The "no device" state: writes are swallowed, reads yield nothing.
/// Lets the whole unit run headless for bench testing.
pub struct NoDeviceSerial;

impl SerialIo for NoDeviceSerial {
    fn write_all(&mut self, _bytes: &[u8]) -> Result<(), ModemError> {
        Ok(())
    }

    fn bytes_waiting(&mut self) -> Result<usize, ModemError> {
        Ok(0)
    }

    fn read_available(&mut self, _buf: &mut Vec<u8>) -> Result<usize, ModemError> {
        Ok(0)
    }
}

// ───────────────────────────────────────────────────────────────
// Fake relay
// ───────────────────────────────────────────────────────────────

/// Relay fake backed by shared atomics. Clones observe the same pin, so a
/// test can force the "electrically high with no deadline" inconsistency.
#[derive(Clone, Default)]
pub struct FakeRelay {
    level: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl FakeRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the physical level behind the controller's back.
    pub fn force_level(&self, high: bool) {
        self.level.store(high, Ordering::SeqCst);
    }

    /// Make every subsequent write fail, simulating a wiring fault.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn level(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }
}

impl RelayIo for FakeRelay {
    fn set_high(&mut self) -> Result<(), RelayError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RelayError::GpioWrite("simulated fault".to_string()));
        }
        self.level.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), RelayError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RelayError::GpioWrite("simulated fault".to_string()));
        }
        self.level.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_high(&mut self) -> Result<bool, RelayError> {
        Ok(self.level.load(Ordering::SeqCst))
    }
}

// ───────────────────────────────────────────────────────────────
// Fake gas probe
// ───────────────────────────────────────────────────────────────

/// Gas probe fake; the test sets the raw level the sampler will read.
#[derive(Clone)]
pub struct FakeGasProbe {
    level: Arc<AtomicU32>,
    available: Arc<AtomicBool>,
}

impl FakeGasProbe {
    pub fn new(initial: u32) -> Self {
        Self {
            level: Arc::new(AtomicU32::new(initial)),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_level(&self, level: u32) {
        self.level.store(level, Ordering::SeqCst);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl GasProbe for FakeGasProbe {
    fn read_level(&mut self) -> Result<u32, SensorError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(SensorError::Unavailable("simulated failure".to_string()));
        }
        Ok(self.level.load(Ordering::SeqCst))
    }
}

// ───────────────────────────────────────────────────────────────
// Fake input pin
// ───────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct FakeInputPin {
    level: Arc<AtomicBool>,
}

impl FakeInputPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_high(&self, high: bool) {
        self.level.store(high, Ordering::SeqCst);
    }
}

impl InputPin for FakeInputPin {
    fn is_high(&mut self) -> Result<bool, SensorError> {
        Ok(self.level.load(Ordering::SeqCst))
    }
}

// ───────────────────────────────────────────────────────────────
// Recording system control
// ───────────────────────────────────────────────────────────────

/// Records restart/shutdown requests instead of acting on them.
#[derive(Clone, Default)]
pub struct RecordingControl {
    restarts: Arc<AtomicU32>,
    shutdowns: Arc<AtomicU32>,
}

impl RecordingControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> u32 {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl SystemControl for RecordingControl {
    fn restart(&mut self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }

    fn shutdown(&mut self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
