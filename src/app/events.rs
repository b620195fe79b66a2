//! Typed events flowing into the orchestrator over its channels.
//!
//! Producer threads (gas sampler, ring-indicator watcher, poll ticker) push
//! these; the orchestrator consumes them once per cycle. Every event is an
//! edge, never a level, so a slow consumer can never act on stale state.

/// Gas detection edges from the sampler thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasEvent {
    /// Concentration crossed the trigger threshold.
    Detected { level: u32 },
    /// Concentration fell back to the all-clear threshold.
    Cleared { level: u32 },
}

/// "There may be messages waiting" signals. The orchestrator treats both
/// kinds identically; the distinction only matters in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitSignal {
    /// The modem's ring-indicator pin pulsed.
    RingIndicator,
    /// The fixed-interval poll fallback fired.
    PollTick,
}
