//! Property tests for the safety-bearing state machines.

use std::time::{Duration, Instant};

use proptest::prelude::*;

use hangarwarmer::config::SystemConfig;
use hangarwarmer::dispatch::{dispatch, DispatchOutcome};
use hangarwarmer::hal::sim::FakeRelay;
use hangarwarmer::heater::HeaterController;
use hangarwarmer::modem::wire::{normalize_phone, SmsMessage};
use hangarwarmer::sensors::gas::{GasMonitor, GasTransition};

const TRIGGER: u32 = 230;
const ALL_CLEAR: u32 = 220;

proptest! {
    /// After every sample the latch obeys the band rules: at or above the
    /// trigger it is set, at or below the all-clear it is clear, and inside
    /// the band it holds its previous value.
    #[test]
    fn gas_latch_follows_the_band(levels in proptest::collection::vec(0u32..400, 1..200)) {
        let mut monitor = GasMonitor::new(TRIGGER, ALL_CLEAR);
        let mut previous = false;
        for level in levels {
            monitor.observe(level);
            let now = monitor.is_detected();
            if level >= TRIGGER {
                prop_assert!(now);
            } else if level <= ALL_CLEAR {
                prop_assert!(!now);
            } else {
                prop_assert_eq!(now, previous, "in-band sample must not flip the latch");
            }
            previous = now;
        }
    }

    /// Edges strictly alternate: two Detected (or two Cleared) can never
    /// occur without the opposite edge between them.
    #[test]
    fn gas_edges_alternate(levels in proptest::collection::vec(0u32..400, 1..200)) {
        let mut monitor = GasMonitor::new(TRIGGER, ALL_CLEAR);
        let mut last_edge = None;
        for level in levels {
            match monitor.observe(level) {
                GasTransition::None => {}
                edge => {
                    prop_assert_ne!(Some(edge), last_edge);
                    last_edge = Some(edge);
                }
            }
        }
    }

    /// Whatever sequence of commands and clock advances happens, the relay
    /// level and the armed deadline always agree.
    #[test]
    fn heater_relay_and_deadline_agree(ops in proptest::collection::vec(0u8..3, 1..100)) {
        let relay = FakeRelay::new();
        let mut heater =
            HeaterController::new(relay.clone(), Duration::from_secs(3600)).unwrap();
        let mut now = Instant::now();

        for op in ops {
            match op {
                0 => {
                    let _ = heater.turn_on(now);
                }
                1 => {
                    let _ = heater.turn_off();
                }
                _ => {
                    now += Duration::from_secs(1800);
                    let _ = heater.tick(now);
                }
            }
            prop_assert_eq!(heater.is_on(), relay.level());
        }
    }

    /// Phone normalization only ever emits digits.
    #[test]
    fn normalized_numbers_are_digits(raw in "\\PC{0,40}") {
        prop_assert!(normalize_phone(&raw).chars().all(|c| c.is_ascii_digit()));
    }

    /// A sender off the allow-list can never reach command execution,
    /// whatever the body says.
    #[test]
    fn strangers_never_execute_commands(
        sender in "[0-9]{7,15}",
        body in "[a-zA-Z ]{1,32}",
    ) {
        let mut config = SystemConfig::default();
        config.allowed_phone_numbers = vec!["12065551234".to_string()];
        prop_assume!(!sender.contains("12065551234") && !"12065551234".contains(&sender));

        let msg = SmsMessage {
            id: 1,
            sender,
            status: "REC UNREAD".to_string(),
            sent_time: None,
            text: body,
        };
        match dispatch(&msg, &config) {
            DispatchOutcome::Alert { .. } => {}
            other => prop_assert!(false, "expected alert, got {:?}", other),
        }
    }
}
