//! Modem protocol engine.
//!
//! Turns the half-duplex AT-command serial channel into a set of typed,
//! serialized operations: send SMS, list/delete stored messages, read
//! battery and signal state. One mutex guards the whole command exchange so
//! a multi-step sequence (CMGS submission) can never interleave with
//! another operation's partial exchange.
//!
//! Failure semantics: serial errors are caught per command and logged by the
//! caller; nothing here retries in a tight loop. The decision loop simply
//! tries again on its next tick. Only connection exhaustion at startup is
//! fatal, and that is `main`'s call.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};

use crate::app::events::WaitSignal;
use crate::config::SystemConfig;
use crate::error::ModemError;
use crate::hal::{InputPin, SerialIo};
use crate::modem::wire::{normalize_phone, BatteryCondition, SignalStrength, SmsMessage};

/// SUB control byte terminating an SMS body in text mode.
pub const SMS_END_OF_TEXT: u8 = 0x1A;

/// Terminator appended to every AT command.
const COMMAND_EOL: &str = "\r\r\n ";

/// Poll granularity while waiting for response bytes.
const RESPONSE_POLL: Duration = Duration::from_millis(50);

// ───────────────────────────────────────────────────────────────
// Connection establishment
// ───────────────────────────────────────────────────────────────

/// Open the serial device through `open`, retrying up to `max_retries`
/// times with `backoff` between attempts. Returns the last error when
/// exhausted. Generic over the opener so the retry bound is testable
/// without hardware.
pub fn connect<S, F>(mut open: F, max_retries: u32, backoff: Duration) -> Result<S, ModemError>
where
    S: SerialIo,
    F: FnMut() -> Result<S, ModemError>,
{
    let mut last_error = ModemError::NoDevice;
    for attempt in 1..=max_retries {
        match open() {
            Ok(serial) => {
                info!("modem serial link up on attempt {attempt}");
                return Ok(serial);
            }
            Err(e) => {
                warn!("modem connect attempt {attempt}/{max_retries} failed: {e}");
                last_error = e;
                if attempt < max_retries {
                    std::thread::sleep(backoff);
                }
            }
        }
    }
    Err(ModemError::ConnectExhausted {
        attempts: max_retries,
        last_error: last_error.to_string(),
    })
}

// ───────────────────────────────────────────────────────────────
// Timing
// ───────────────────────────────────────────────────────────────

/// Think-time and response-window durations for the physical modem.
#[derive(Debug, Clone, Copy)]
pub struct ModemTiming {
    /// Pause after a write before the reply is drained.
    pub think_time: Duration,
    /// Longest wait for any response bytes before the exchange is a timeout.
    pub response_window: Duration,
}

impl ModemTiming {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            think_time: Duration::from_secs(config.modem_think_time_secs),
            response_window: Duration::from_secs(config.modem_response_window_secs),
        }
    }

    /// Zero delays, for tests against the scripted serial fake.
    pub fn instant() -> Self {
        Self {
            think_time: Duration::ZERO,
            response_window: Duration::ZERO,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Engine
// ───────────────────────────────────────────────────────────────

struct PendingSms {
    number: String,
    text: String,
    retries_left: u32,
}

/// The modem session: exclusive owner of the serial handle, self-serializing
/// through one lock around every exchange.
pub struct ModemEngine<S: SerialIo> {
    serial: Mutex<S>,
    timing: ModemTiming,
    /// Outbound messages awaiting (re)delivery; flushed once per tick.
    outbound: Mutex<VecDeque<PendingSms>>,
    send_retries: u32,
    /// Fed by the ring-indicator watcher and the poll ticker.
    waiting_rx: Receiver<WaitSignal>,
}

impl<S: SerialIo> ModemEngine<S> {
    pub fn new(
        serial: S,
        timing: ModemTiming,
        send_retries: u32,
        waiting_rx: Receiver<WaitSignal>,
    ) -> Self {
        Self {
            serial: Mutex::new(serial),
            timing,
            outbound: Mutex::new(VecDeque::new()),
            send_retries,
            waiting_rx,
        }
    }

    /// Modem bring-up: probe, quiet error reporting (CMGS needs it), SMS
    /// text mode, and ring-indicator pulse on message arrival. Replies are
    /// drained and discarded; a dead modem surfaces on the first real
    /// operation instead.
    pub fn initialize(&self) {
        for command in ["AT", "AT+CMEE=0", "AT+CMGF=1", "AT+CFGRI=1"] {
            match self.send_command(command) {
                Ok(lines) => debug!("{command} -> {lines:?}"),
                Err(e) => warn!("{command} failed during bring-up: {e}"),
            }
        }
    }

    // ── Command exchange primitive ────────────────────────────

    /// Write one command and drain the reply lines. Holds the session lock
    /// for the whole exchange.
    pub fn send_command(&self, command: &str) -> Result<Vec<String>, ModemError> {
        let mut serial = self.serial.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::exchange(&mut serial, &self.timing, command)
    }

    /// The locked exchange body. `serial` is the already-held guard target,
    /// so multi-step sequences can reuse it under one acquisition.
    fn exchange(
        serial: &mut S,
        timing: &ModemTiming,
        command: &str,
    ) -> Result<Vec<String>, ModemError> {
        serial.write_all(command.as_bytes())?;
        serial.write_all(COMMAND_EOL.as_bytes())?;
        std::thread::sleep(timing.think_time);

        let raw = Self::drain_reply(serial, timing)?;
        if raw.is_empty() {
            return Err(ModemError::Timeout {
                command: command.to_string(),
            });
        }
        Ok(split_reply_lines(&raw))
    }

    /// Wait up to the response window for the first bytes, then keep
    /// draining until the device goes quiet.
    fn drain_reply(serial: &mut S, timing: &ModemTiming) -> Result<Vec<u8>, ModemError> {
        let mut buf = Vec::new();
        let deadline = Instant::now() + timing.response_window;

        while serial.bytes_waiting()? == 0 {
            if Instant::now() >= deadline {
                return Ok(buf);
            }
            std::thread::sleep(RESPONSE_POLL);
        }

        loop {
            let got = serial.read_available(&mut buf)?;
            if got == 0 {
                // Settle window: give a slow modem one more chance to
                // finish the line before the exchange is declared over.
                std::thread::sleep(RESPONSE_POLL);
                if serial.bytes_waiting()? == 0 {
                    break;
                }
            }
        }
        Ok(buf)
    }

    // ── SMS submission ────────────────────────────────────────

    /// Send one SMS now. The entire CMGS sequence happens under a single
    /// lock acquisition so no other exchange can interleave with it.
    pub fn send_sms(&self, number: &str, text: &str) -> Result<(), ModemError> {
        let cleaned = normalize_phone(number);
        if cleaned.is_empty() {
            return Err(ModemError::Io("empty destination number".to_string()));
        }

        let mut serial = self.serial.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let _ = Self::exchange(&mut serial, &self.timing, "AT+CMGF=1");

        serial.write_all(format!("AT+CMGS=\"{cleaned}\"\r").as_bytes())?;
        std::thread::sleep(self.timing.think_time);
        let _ = Self::drain_reply(&mut serial, &self.timing)?; // the ">" prompt

        serial.write_all(text.as_bytes())?;
        serial.write_all(&[SMS_END_OF_TEXT])?;
        std::thread::sleep(self.timing.think_time);
        let reply = Self::drain_reply(&mut serial, &self.timing)?;
        // A silent modem is a failed delivery, not a quiet success; the
        // outbound queue must get its retry.
        if reply.is_empty() {
            return Err(ModemError::Timeout {
                command: format!("AT+CMGS=\"{cleaned}\""),
            });
        }
        let reply = String::from_utf8_lossy(&reply);

        if reply.contains("ERROR") {
            return Err(ModemError::Io(format!("CMGS rejected: {}", reply.trim())));
        }
        debug!("SMS sent to {cleaned}");
        Ok(())
    }

    /// Queue an SMS for delivery on the next flush. Used for every
    /// orchestrator-originated message so a transient modem failure costs a
    /// tick, not the message.
    pub fn queue_sms(&self, number: &str, text: &str) {
        let mut outbound = self.outbound.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        outbound.push_back(PendingSms {
            number: number.to_string(),
            text: text.to_string(),
            retries_left: self.send_retries,
        });
    }

    /// Attempt delivery of everything queued. Failures are re-queued with
    /// one fewer retry; exhausted messages are dropped with a warning.
    pub fn flush_outbound(&self) {
        let mut pending: VecDeque<PendingSms> = {
            let mut outbound = self.outbound.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            outbound.drain(..).collect()
        };

        let mut retry = VecDeque::new();
        while let Some(mut sms) = pending.pop_front() {
            match self.send_sms(&sms.number, &sms.text) {
                Ok(()) => {}
                Err(e) => {
                    sms.retries_left = sms.retries_left.saturating_sub(1);
                    if sms.retries_left == 0 {
                        warn!("dropping SMS to {} after retries: {e}", sms.number);
                    } else {
                        debug!(
                            "SMS to {} failed ({e}); {} retries left",
                            sms.number, sms.retries_left
                        );
                        retry.push_back(sms);
                    }
                }
            }
        }

        if !retry.is_empty() {
            let mut outbound = self.outbound.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            // Retries go to the front so ordering survives new queueing.
            for sms in retry.into_iter().rev() {
                outbound.push_front(sms);
            }
        }
    }

    /// Number of messages still awaiting delivery.
    pub fn outbound_len(&self) -> usize {
        let outbound = self
            .outbound
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        outbound.len()
    }

    // ── Stored-message operations ─────────────────────────────

    /// List every message on the SIM. Header lines are paired with the body
    /// line that follows; malformed records are dropped with a warning
    /// rather than failing the batch.
    pub fn list_messages(&self) -> Result<Vec<SmsMessage>, ModemError> {
        let lines = self.send_command("AT+CMGL=\"ALL\"")?;
        let mut messages = Vec::new();

        let mut iter = lines.iter().peekable();
        while let Some(line) = iter.next() {
            if !line.contains("+CMGL:") {
                continue;
            }
            let body = iter.peek().map_or("", |next| next.as_str());
            match SmsMessage::parse(line, body) {
                Ok(msg) => {
                    messages.push(msg);
                    let _ = iter.next(); // consume the body line
                }
                Err(e) => warn!("dropping record: {e}"),
            }
        }

        // The worklist is being fetched; pending waiting signals are stale.
        self.clear_waiting_signals();
        Ok(messages)
    }

    /// Delete one stored message by SIM index.
    pub fn delete_message(&self, id: u32) -> Result<(), ModemError> {
        self.send_command(&format!("AT+CMGD={id}")).map(|_| ())
    }

    /// Delete everything on the SIM; returns how many were removed.
    /// Used at startup so stale commands are never replayed.
    pub fn delete_all_messages(&self) -> Result<usize, ModemError> {
        let messages = self.list_messages()?;
        let mut deleted = 0;
        for msg in &messages {
            match self.delete_message(msg.id) {
                Ok(()) => deleted += 1,
                Err(e) => warn!("failed to delete message {}: {e}", msg.id),
            }
        }
        Ok(deleted)
    }

    // ── Health queries ────────────────────────────────────────

    /// Battery state via `AT+CBC`. Any failure degrades to the explicit
    /// unknown condition.
    pub fn battery_condition(&self) -> BatteryCondition {
        match self.send_command("AT+CBC") {
            Ok(lines) => lines
                .iter()
                .find(|line| line.contains("CBC:"))
                .map_or_else(BatteryCondition::unknown, |line| {
                    BatteryCondition::parse(line)
                }),
            Err(e) => {
                debug!("CBC query failed: {e}");
                BatteryCondition::unknown()
            }
        }
    }

    /// Signal state via `AT+CSQ`; degrades to rssi 0 on failure.
    pub fn signal_strength(&self) -> SignalStrength {
        match self.send_command("AT+CSQ") {
            Ok(lines) => lines
                .iter()
                .find(|line| line.contains("CSQ:"))
                .map_or(
                    SignalStrength {
                        rssi: 0,
                        bit_error_rate: 0,
                    },
                    |line| SignalStrength::parse(line),
                ),
            Err(e) => {
                debug!("CSQ query failed: {e}");
                SignalStrength {
                    rssi: 0,
                    bit_error_rate: 0,
                }
            }
        }
    }

    // ── Message-waiting signal ────────────────────────────────

    /// Non-blocking: is there a ring-indicator pulse or poll tick queued?
    pub fn is_message_waiting(&self) -> bool {
        !self.waiting_rx.is_empty()
    }

    fn clear_waiting_signals(&self) {
        while self.waiting_rx.try_recv().is_ok() {}
    }
}

/// Split a raw reply buffer into trimmed, non-empty lines.
fn split_reply_lines(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

// ───────────────────────────────────────────────────────────────
// Waiting-signal producers
// ───────────────────────────────────────────────────────────────

/// Handles to the two producer threads feeding the waiting-signal channel.
/// Dropping without `stop()` leaves them running until process exit.
pub struct WaitingSources {
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WaitingSources {
    pub fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

/// Granularity of the ring-indicator pin scan.
const RI_SCAN_INTERVAL: Duration = Duration::from_millis(100);

/// Spawn the ring-indicator watcher (if a pin is wired) and the
/// fixed-interval poll ticker. Both only ever push [`WaitSignal`]s; they
/// never touch the modem lock.
pub fn spawn_waiting_sources(
    tx: &Sender<WaitSignal>,
    ring_indicator: Option<impl InputPin + 'static>,
    poll_interval: Duration,
) -> WaitingSources {
    let stop = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::new();

    if let Some(mut pin) = ring_indicator {
        let tx = tx.clone();
        let stop_flag = Arc::clone(&stop);
        handles.push(std::thread::spawn(move || {
            let mut last_high = false;
            while !stop_flag.load(Ordering::SeqCst) {
                match pin.is_high() {
                    Ok(high) => {
                        if high && !last_high {
                            debug!("ring indicator pulsed");
                            let _ = tx.send(WaitSignal::RingIndicator);
                        }
                        last_high = high;
                    }
                    Err(e) => warn!("ring indicator read failed: {e}"),
                }
                std::thread::sleep(RI_SCAN_INTERVAL);
            }
        }));
    }

    {
        let tx = tx.clone();
        let stop_flag = Arc::clone(&stop);
        handles.push(std::thread::spawn(move || {
            let mut next_tick = Instant::now() + poll_interval;
            while !stop_flag.load(Ordering::SeqCst) {
                if Instant::now() >= next_tick {
                    let _ = tx.send(WaitSignal::PollTick);
                    next_tick = Instant::now() + poll_interval;
                }
                std::thread::sleep(RI_SCAN_INTERVAL.min(poll_interval));
            }
        }));
    }

    WaitingSources { stop, handles }
}
