//! GSM modem stack: wire-format parsing, the serialized AT-command engine,
//! and the inbound message worklist.

pub mod engine;
pub mod mailbox;
pub mod wire;

pub use engine::{connect, spawn_waiting_sources, ModemEngine, ModemTiming, WaitingSources};
pub use mailbox::fetch_worklist;
pub use wire::{
    is_allowed_number, normalize_phone, BatteryCondition, MessageTimestamp, SignalClass,
    SignalStrength, SmsMessage,
};
