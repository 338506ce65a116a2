//! Simulated time.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A point on the simulated calendar.
///
/// Simulated time has no time zone; the run starts at a configured instant
/// and advances by a fixed step.
pub type Timestamp = NaiveDateTime;

/// The clock's view of "now": the simulated instant and how many ticks have
/// elapsed to reach it.
///
/// Ordering compares the instant first, then the step counter. Both fields
/// only ever grow during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimulationTime {
    /// Current simulated instant.
    pub time: Timestamp,
    /// Number of ticks since the start of the run (0 before the first tick).
    pub step: u64,
}

impl SimulationTime {
    /// Create a simulation time from its parts.
    pub const fn new(time: Timestamp, step: u64) -> Self {
        Self { time, step }
    }
}

impl core::fmt::Display for SimulationTime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} (step {})", self.time, self.step)
    }
}
