//! Heater relay control with the mandatory maximum-run shutoff.
//!
//! Invariant: the relay is energized exactly when a shutoff deadline is
//! armed. A failed pin write leaves the deadline unarmed, and `tick`
//! reconciles the one way the pair can drift apart in the field: the pin
//! electrically high with no deadline armed.

use std::time::{Duration, Instant};

use log::{info, warn};

use crate::error::RelayError;
use crate::hal::RelayIo;

/// Safety events surfaced by [`HeaterController::tick`]; the orchestrator
/// broadcasts these to the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterEvent {
    /// The maximum run time elapsed and the heater was forced off.
    MaxTimeShutoff { ran_for: Duration },
    /// The relay was found energized with no deadline armed; forced off.
    ReconciledOff,
}

pub struct HeaterController<R: RelayIo> {
    relay: R,
    max_run: Duration,
    deadline: Option<Instant>,
}

impl<R: RelayIo> HeaterController<R> {
    /// Construction forces the relay off; a crash-restart must never leave
    /// the heater running unsupervised.
    pub fn new(mut relay: R, max_run: Duration) -> Result<Self, RelayError> {
        relay.set_low()?;
        Ok(Self {
            relay,
            max_run,
            deadline: None,
        })
    }

    pub fn is_on(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left before the forced shutoff, when running.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }

    /// Energize the relay and arm the shutoff deadline. Returns `false` if
    /// the heater was already on; the existing deadline is left alone so a
    /// repeated "on" cannot extend the run past the original limit.
    pub fn turn_on(&mut self, now: Instant) -> Result<bool, RelayError> {
        if self.deadline.is_some() {
            return Ok(false);
        }
        self.relay.set_high()?;
        self.deadline = Some(now + self.max_run);
        info!("heater on; forced shutoff in {:?}", self.max_run);
        Ok(true)
    }

    /// De-energize and disarm. Returns `false` if it was already off.
    /// On a relay write failure the deadline stays armed, so the next tick
    /// keeps trying to drive the pin low.
    pub fn turn_off(&mut self) -> Result<bool, RelayError> {
        if self.deadline.is_none() {
            return Ok(false);
        }
        self.relay.set_low()?;
        self.deadline = None;
        info!("heater off");
        Ok(true)
    }

    /// Run the safety checks for this cycle.
    pub fn tick(&mut self, now: Instant) -> Result<Option<HeaterEvent>, RelayError> {
        if let Some(deadline) = self.deadline {
            if now >= deadline {
                warn!("maximum run time reached, forcing heater off");
                self.relay.set_low()?;
                self.deadline = None;
                return Ok(Some(HeaterEvent::MaxTimeShutoff {
                    ran_for: self.max_run,
                }));
            }
            return Ok(None);
        }

        // Deadline disarmed: the pin must be low. Anything else means the
        // hardware and our state disagree, and the hardware loses.
        if self.relay.is_high()? {
            warn!("relay energized with no shutoff armed, forcing off");
            self.relay.set_low()?;
            return Ok(Some(HeaterEvent::ReconciledOff));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::FakeRelay;

    fn controller(max_run: Duration) -> (HeaterController<FakeRelay>, FakeRelay) {
        let relay = FakeRelay::new();
        let c = HeaterController::new(relay.clone(), max_run).unwrap();
        (c, relay)
    }

    #[test]
    fn construction_forces_relay_off() {
        let relay = FakeRelay::new();
        relay.force_level(true);
        let c = HeaterController::new(relay.clone(), Duration::from_secs(60)).unwrap();
        assert!(!relay.level());
        assert!(!c.is_on());
    }

    #[test]
    fn on_off_drives_relay_and_deadline_together() {
        let (mut c, relay) = controller(Duration::from_secs(3600));
        let now = Instant::now();

        assert!(c.turn_on(now).unwrap());
        assert!(relay.level());
        assert!(c.is_on());
        assert!(c.remaining(now).unwrap() <= Duration::from_secs(3600));

        assert!(c.turn_off().unwrap());
        assert!(!relay.level());
        assert!(!c.is_on());
    }

    #[test]
    fn turn_on_is_idempotent_and_never_extends_the_deadline() {
        let (mut c, _relay) = controller(Duration::from_secs(3600));
        let t0 = Instant::now();
        assert!(c.turn_on(t0).unwrap());
        let first_deadline = c.remaining(t0).unwrap();

        let later = t0 + Duration::from_secs(600);
        assert!(!c.turn_on(later).unwrap(), "second on is a no-op");
        let after = c.remaining(t0).unwrap();
        assert_eq!(first_deadline, after);
    }

    #[test]
    fn max_time_forces_off_exactly_once() {
        let (mut c, relay) = controller(Duration::from_secs(60));
        let t0 = Instant::now();
        c.turn_on(t0).unwrap();

        let before = t0 + Duration::from_secs(59);
        assert_eq!(c.tick(before).unwrap(), None);

        let expired = t0 + Duration::from_secs(60);
        assert_eq!(
            c.tick(expired).unwrap(),
            Some(HeaterEvent::MaxTimeShutoff {
                ran_for: Duration::from_secs(60)
            })
        );
        assert!(!relay.level());
        assert!(!c.is_on());

        // Already off: no second event.
        assert_eq!(c.tick(expired + Duration::from_secs(1)).unwrap(), None);
    }

    #[test]
    fn reconciles_relay_high_with_no_deadline() {
        let (mut c, relay) = controller(Duration::from_secs(60));
        relay.force_level(true);

        let event = c.tick(Instant::now()).unwrap();
        assert_eq!(event, Some(HeaterEvent::ReconciledOff));
        assert!(!relay.level());
    }

    #[test]
    fn failed_turn_on_leaves_deadline_unarmed() {
        let (mut c, relay) = controller(Duration::from_secs(60));
        relay.fail_writes(true);

        assert!(c.turn_on(Instant::now()).is_err());
        assert!(!c.is_on(), "no deadline without an energized relay");
    }

    #[test]
    fn failed_turn_off_keeps_deadline_armed() {
        let (mut c, relay) = controller(Duration::from_secs(60));
        c.turn_on(Instant::now()).unwrap();

        relay.fail_writes(true);
        assert!(c.turn_off().is_err());
        assert!(c.is_on(), "retry happens next tick, state must not lie");

        relay.fail_writes(false);
        assert!(c.turn_off().unwrap());
        assert!(!relay.level());
    }
}
