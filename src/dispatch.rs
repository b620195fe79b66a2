//! SMS command dispatch.
//!
//! Pure decision logic: given one inbound message and the configuration,
//! decide what the orchestrator should do. No I/O happens here, which keeps
//! every gate (sender length, body length, allow-list, command precedence)
//! testable as a plain function.

use std::fmt::Write as _;
use std::time::Duration;

use log::{info, warn};

use crate::config::SystemConfig;
use crate::modem::wire::{is_allowed_number, BatteryCondition, SignalClass, SmsMessage};
use crate::sensors::gas::GasReading;
use crate::sensors::light::LightLevel;

/// A recognized command word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TurnOn,
    TurnOff,
    Status,
    Help,
    Restart,
    Shutdown,
}

/// What the orchestrator should do with one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Known-good number sent a recognized command; reply goes to them.
    Act { command: Command, reply_to: String },
    /// Allowed sender, unrecognized body; they get the help text back.
    Unknown { reply_to: String },
    /// Allowed sender, body failed a gate; they get an error reply.
    Invalid { reply_to: String, reason: String },
    /// Someone off the allow-list tried to command the unit. No reply to
    /// them; the owners get this alert instead.
    Alert { text: String },
}

/// Match the command word inside the body. Substring match, first hit in
/// fixed precedence order, so "turn on please" works and "on" can never be
/// shadowed by a longer word containing it.
pub fn parse_command(body: &str) -> Option<Command> {
    let lowered = body.to_lowercase();
    const PRECEDENCE: [(&str, Command); 6] = [
        ("on", Command::TurnOn),
        ("off", Command::TurnOff),
        ("status", Command::Status),
        ("help", Command::Help),
        ("restart", Command::Restart),
        ("shutdown", Command::Shutdown),
    ];
    PRECEDENCE
        .iter()
        .find(|(word, _)| lowered.contains(word))
        .map(|&(_, command)| command)
}

/// Run every gate and produce the outcome for one message.
pub fn dispatch(msg: &SmsMessage, config: &SystemConfig) -> DispatchOutcome {
    let digits = msg.sender_digits();
    if digits.len() < config.min_phone_digits {
        // Carrier short codes cannot command the unit, but the owners
        // still hear about the attempt.
        warn!("message from invalid short sender {:?}", msg.sender);
        return DispatchOutcome::Alert {
            text: format!(
                "Received message from invalid phone number {}: {}",
                msg.sender, msg.text
            ),
        };
    }

    if !is_allowed_number(&digits, &config.allowed_phone_numbers) {
        warn!("unauthorized command attempt from {digits}: {:?}", msg.text);
        return DispatchOutcome::Alert {
            text: format!("Received unauthorized message from {digits}: {}", msg.text),
        };
    }

    if msg.text.is_empty() || msg.text.len() > config.max_message_len {
        info!("invalid-length message from {digits}");
        return DispatchOutcome::Invalid {
            reply_to: digits,
            reason: format!(
                "Message must be 1 to {} characters.",
                config.max_message_len
            ),
        };
    }

    match parse_command(&msg.text) {
        Some(command) => DispatchOutcome::Act {
            command,
            reply_to: digits,
        },
        None => {
            info!("unrecognized command from {digits}: {:?}", msg.text);
            DispatchOutcome::Unknown { reply_to: digits }
        }
    }
}

/// Body of the help reply.
pub fn help_text() -> &'static str {
    "Commands: ON, OFF, STATUS, HELP, RESTART, SHUTDOWN"
}

// ───────────────────────────────────────────────────────────────
// Heater command policy
// ───────────────────────────────────────────────────────────────

/// What the orchestrator should do to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterAction {
    /// State already matches (or gas forbids the change); reply only.
    Ignore,
    Energize,
    Deenergize,
}

/// Policy for ON/OFF: the gas override and the idempotence replies live
/// here; the relay mechanics stay in the controller. Pure, so the refusal
/// rules are testable without hardware.
pub fn arbitrate_heater(
    turn_on: bool,
    heater_on: bool,
    time_remaining: Option<Duration>,
    gas_detected: bool,
    max_run: Duration,
) -> (HeaterAction, String) {
    if turn_on {
        if gas_detected {
            return (
                HeaterAction::Ignore,
                "Gas is detected in the hangar. Heater will NOT be turned on.".to_string(),
            );
        }
        if heater_on {
            let remaining = time_remaining.unwrap_or(Duration::ZERO);
            return (
                HeaterAction::Ignore,
                format!(
                    "Heater is already ON, {} until shutoff.",
                    format_duration(remaining)
                ),
            );
        }
        (
            HeaterAction::Energize,
            format!(
                "Heater is ON. It will turn off automatically after {}.",
                format_duration(max_run)
            ),
        )
    } else {
        if !heater_on {
            return (HeaterAction::Ignore, "Heater is already OFF.".to_string());
        }
        let remaining = time_remaining.unwrap_or(Duration::ZERO);
        (
            HeaterAction::Deenergize,
            format!(
                "Heater is OFF with {} left on the clock.",
                format_duration(remaining)
            ),
        )
    }
}

// ───────────────────────────────────────────────────────────────
// Status rendering
// ───────────────────────────────────────────────────────────────

/// Everything the STATUS reply reports, gathered by the orchestrator.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub heater_on: bool,
    /// Time until the forced shutoff, when the heater is running.
    pub time_remaining: Option<Duration>,
    pub gas_enabled: bool,
    pub gas: GasReading,
    /// Fahrenheit, when the probe is wired and readable.
    pub temperature_f: Option<f64>,
    pub light: Option<LightLevel>,
    pub battery: BatteryCondition,
    pub signal: SignalClass,
    /// Time since the unit came online.
    pub uptime: Duration,
}

/// Render the STATUS reply body.
pub fn render_status(s: &StatusSnapshot) -> String {
    let mut out = String::new();

    if s.heater_on {
        let remaining = s.time_remaining.unwrap_or(Duration::ZERO);
        let _ = write!(out, "Heater is ON, {} until shutoff.", format_duration(remaining));
    } else {
        out.push_str("Heater is OFF.");
    }

    if !s.gas_enabled {
        out.push_str(" Gas sensor not enabled.");
    } else if !s.gas.valid {
        out.push_str(" Gas sensor unavailable.");
    } else if s.gas.detected {
        let _ = write!(out, " GAS DETECTED (level {}).", s.gas.level);
    } else {
        let _ = write!(out, " Gas level {}.", s.gas.level);
    }

    if let Some(temp) = s.temperature_f {
        let _ = write!(out, " Temp {temp:.0}F.");
    }
    if let Some(light) = s.light {
        let _ = write!(out, " Hangar is {light}.");
    }

    if s.battery.known {
        let _ = write!(out, " Battery {}%.", s.battery.charge_percent);
    } else {
        out.push_str(" Battery unknown.");
    }
    let _ = write!(out, " Signal {}.", s.signal);
    let _ = write!(out, " Up {}.", format_duration(s.uptime));
    out
}

/// Human formatting for a run duration, e.g. `1h 05m` or `42m`.
pub fn format_duration(d: Duration) -> String {
    let total_minutes = d.as_secs() / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: &str, text: &str) -> SmsMessage {
        SmsMessage {
            id: 1,
            sender: sender.to_string(),
            status: "REC UNREAD".to_string(),
            sent_time: None,
            text: text.to_string(),
        }
    }

    fn config_with_owner() -> SystemConfig {
        let mut c = SystemConfig::default();
        c.allowed_phone_numbers = vec!["12065551234".to_string()];
        c
    }

    #[test]
    fn precedence_on_beats_everything() {
        assert_eq!(parse_command("turn on the heater"), Some(Command::TurnOn));
        // "on" appears nowhere in "off", so OFF wins when it's alone.
        assert_eq!(parse_command("OFF"), Some(Command::TurnOff));
        assert_eq!(parse_command("Status please"), Some(Command::Status));
        assert_eq!(parse_command("help"), Some(Command::Help));
        assert_eq!(parse_command("restart"), Some(Command::Restart));
        assert_eq!(parse_command("shutdown"), Some(Command::Shutdown));
        assert_eq!(parse_command("hello there"), None);
    }

    #[test]
    fn case_insensitive_matching() {
        assert_eq!(parse_command("ON"), Some(Command::TurnOn));
        assert_eq!(parse_command("StAtUs"), Some(Command::Status));
    }

    #[test]
    fn allowed_sender_gets_action() {
        let outcome = dispatch(&message("+12065551234", "on"), &config_with_owner());
        assert_eq!(
            outcome,
            DispatchOutcome::Act {
                command: Command::TurnOn,
                reply_to: "12065551234".to_string()
            }
        );
    }

    #[test]
    fn unknown_body_from_owner_gets_help() {
        let outcome = dispatch(&message("+12065551234", "make it warm"), &config_with_owner());
        assert_eq!(
            outcome,
            DispatchOutcome::Unknown {
                reply_to: "12065551234".to_string()
            }
        );
    }

    #[test]
    fn unauthorized_sender_triggers_alert_not_reply() {
        let outcome = dispatch(&message("+13125550000", "on"), &config_with_owner());
        match outcome {
            DispatchOutcome::Alert { text } => {
                assert!(text.contains("13125550000"));
                assert!(text.contains("on"));
            }
            other => panic!("expected alert, got {other:?}"),
        }
    }

    #[test]
    fn short_code_sender_alerts_owners_without_reply() {
        let outcome = dispatch(&message("8555", "Your bill is ready"), &config_with_owner());
        match outcome {
            DispatchOutcome::Alert { text } => {
                assert!(text.contains("invalid phone number"));
                assert!(text.contains("8555"));
            }
            other => panic!("expected alert, got {other:?}"),
        }
    }

    #[test]
    fn overlong_body_from_owner_gets_error_reply() {
        let long = "x".repeat(33);
        let outcome = dispatch(&message("+12065551234", &long), &config_with_owner());
        match outcome {
            DispatchOutcome::Invalid { reply_to, reason } => {
                assert_eq!(reply_to, "12065551234");
                assert!(reason.contains("32"));
            }
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[test]
    fn overlong_body_from_stranger_still_alerts() {
        let long = "x".repeat(33);
        let outcome = dispatch(&message("+13125550000", &long), &config_with_owner());
        assert!(matches!(outcome, DispatchOutcome::Alert { .. }));
    }

    #[test]
    fn status_rendering_covers_both_heater_states() {
        let snapshot = StatusSnapshot {
            heater_on: true,
            time_remaining: Some(Duration::from_secs(65 * 60)),
            gas_enabled: true,
            gas: GasReading {
                level: 180,
                detected: false,
                valid: true,
            },
            temperature_f: Some(71.6),
            light: Some(LightLevel::Dark),
            battery: BatteryCondition {
                charge_state: 0,
                charge_percent: 83,
                capacity_mah: 417.5,
                known: true,
            },
            signal: SignalClass::Good,
            uptime: Duration::from_secs(3 * 3600),
        };
        let text = render_status(&snapshot);
        assert!(text.contains("Heater is ON"));
        assert!(text.contains("1h 05m"));
        assert!(text.contains("Gas level 180"));
        assert!(text.contains("Temp 72F"));
        assert!(text.contains("dark"));
        assert!(text.contains("Battery 83%"));
        assert!(text.contains("Up 3h 00m"));

        let off = StatusSnapshot {
            heater_on: false,
            time_remaining: None,
            gas_enabled: false,
            temperature_f: None,
            light: None,
            battery: BatteryCondition::unknown(),
            signal: SignalClass::None,
            ..snapshot
        };
        let text = render_status(&off);
        assert!(text.contains("Heater is OFF"));
        assert!(text.contains("Gas sensor not enabled"));
        assert!(text.contains("Battery unknown"));
    }

    #[test]
    fn gas_detection_vetoes_turn_on() {
        let (action, reply) =
            arbitrate_heater(true, false, None, true, Duration::from_secs(3600));
        assert_eq!(action, HeaterAction::Ignore);
        assert!(reply.contains("NOT be turned on"));
    }

    #[test]
    fn repeated_on_reports_remaining_without_energizing() {
        let (action, reply) = arbitrate_heater(
            true,
            true,
            Some(Duration::from_secs(50 * 60)),
            false,
            Duration::from_secs(3600),
        );
        assert_eq!(action, HeaterAction::Ignore);
        assert!(reply.contains("already ON"));
        assert!(reply.contains("50m"));
    }

    #[test]
    fn off_while_running_reports_time_left_on_the_clock() {
        let (action, reply) = arbitrate_heater(
            false,
            true,
            Some(Duration::from_secs(20 * 60)),
            false,
            Duration::from_secs(3600),
        );
        assert_eq!(action, HeaterAction::Deenergize);
        assert!(reply.contains("Heater is OFF"));
        assert!(reply.contains("20m"));

        let (action, reply) =
            arbitrate_heater(false, false, None, false, Duration::from_secs(3600));
        assert_eq!(action, HeaterAction::Ignore);
        assert!(reply.contains("already OFF"));
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0m");
        assert_eq!(format_duration(Duration::from_secs(42 * 60)), "42m");
        assert_eq!(format_duration(Duration::from_secs(3600 + 5 * 60)), "1h 05m");
    }
}
