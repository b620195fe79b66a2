//! Gas detection with dual-threshold hysteresis.
//!
//! The raw MQ-2 reading is noisy, so a single cutoff would flap around the
//! threshold and spam alert SMS. Detection latches at `trigger_level` and
//! only releases at `all_clear_level`, which must sit strictly below it.
//!
//! A dedicated sampler thread owns the probe, runs the monitor, publishes
//! the latest [`GasReading`] through an [`ArcSwap`] for the status report,
//! and pushes edge events (never levels) to the orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use crossbeam_channel::Sender;
use log::{debug, error, warn};

use crate::app::events::GasEvent;
use crate::hal::GasProbe;

/// Latest published sensor state, read lock-free by the status assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasReading {
    /// Most recent raw ADC value.
    pub level: u32,
    /// Current latched detection state.
    pub detected: bool,
    /// False until the first successful sample, and after a probe failure.
    pub valid: bool,
}

impl GasReading {
    pub fn startup() -> Self {
        Self {
            level: 0,
            detected: false,
            valid: false,
        }
    }
}

/// Result of feeding one sample through the hysteresis latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasTransition {
    /// No edge; the latched state is unchanged.
    None,
    /// Crossed the trigger level while clear.
    Detected,
    /// Dropped to the all-clear level while latched.
    Cleared,
}

/// The hysteresis latch itself. Pure state machine, no I/O, so the safety
/// property is testable without threads or hardware.
#[derive(Debug, Clone)]
pub struct GasMonitor {
    trigger_level: u32,
    all_clear_level: u32,
    detected: bool,
}

impl GasMonitor {
    /// `all_clear` must be strictly below `trigger`; config validation
    /// enforces this before we get here.
    pub fn new(trigger_level: u32, all_clear_level: u32) -> Self {
        debug_assert!(all_clear_level < trigger_level);
        Self {
            trigger_level,
            all_clear_level,
            detected: false,
        }
    }

    pub fn is_detected(&self) -> bool {
        self.detected
    }

    /// Feed one sample; returns the edge, if any. Readings between the two
    /// thresholds never change the latched state.
    pub fn observe(&mut self, level: u32) -> GasTransition {
        if !self.detected && level >= self.trigger_level {
            self.detected = true;
            return GasTransition::Detected;
        }
        if self.detected && level <= self.all_clear_level {
            self.detected = false;
            return GasTransition::Cleared;
        }
        GasTransition::None
    }
}

// ───────────────────────────────────────────────────────────────
// Sampler thread
// ───────────────────────────────────────────────────────────────

/// Handle to the running sampler: the published reading plus lifecycle.
pub struct GasSamplerHandle {
    reading: Arc<ArcSwap<GasReading>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl GasSamplerHandle {
    /// Latest published reading, lock-free.
    pub fn reading(&self) -> GasReading {
        **self.reading.load()
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Granularity of the stop-flag check between samples.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Spawn the sampler thread. It owns `probe` and `monitor` outright; edges
/// go to `events`, levels go to the published reading.
pub fn spawn_gas_sampler(
    mut probe: impl GasProbe + 'static,
    mut monitor: GasMonitor,
    interval: Duration,
    events: &Sender<GasEvent>,
) -> GasSamplerHandle {
    let reading = Arc::new(ArcSwap::from_pointee(GasReading::startup()));
    let stop = Arc::new(AtomicBool::new(false));

    let published = Arc::clone(&reading);
    let stop_flag = Arc::clone(&stop);
    let events = events.clone();

    let handle = std::thread::spawn(move || {
        let mut next_sample = Instant::now();
        while !stop_flag.load(Ordering::SeqCst) {
            if Instant::now() < next_sample {
                std::thread::sleep(STOP_POLL);
                continue;
            }
            next_sample = Instant::now() + interval;

            match probe.read_level() {
                Ok(level) => {
                    let transition = monitor.observe(level);
                    published.store(Arc::new(GasReading {
                        level,
                        detected: monitor.is_detected(),
                        valid: true,
                    }));
                    match transition {
                        GasTransition::Detected => {
                            error!("gas detected at level {level}");
                            let _ = events.send(GasEvent::Detected { level });
                        }
                        GasTransition::Cleared => {
                            warn!("gas cleared at level {level}");
                            let _ = events.send(GasEvent::Cleared { level });
                        }
                        GasTransition::None => debug!("gas level {level}"),
                    }
                }
                Err(e) => {
                    warn!("gas probe read failed: {e}");
                    let last = **published.load();
                    published.store(Arc::new(GasReading {
                        valid: false,
                        ..last
                    }));
                }
            }
        }
    });

    GasSamplerHandle {
        reading,
        stop,
        handle: Some(handle),
    }
}
