//! Hangar warmer control library.
//!
//! SMS-controlled heater unit for an aircraft hangar: a GSM modem on a
//! serial port, a heater relay with a mandatory maximum-run shutoff, and a
//! gas sensor that overrides everything. The decision logic is exposed here
//! so the integration tests run the whole stack against in-memory hardware
//! fakes.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hal;
pub mod heater;
pub mod modem;
pub mod sensors;
