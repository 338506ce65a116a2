//! Simulation clock.
//!
//! The clock is the single source of truth for simulated time. It holds the
//! start instant, the fixed step size, the current instant and the number
//! of ticks taken, and it decides when a run is over.
//!
//! # Design Principles
//!
//! - Time only moves forward, and only through [`SimulationClock::tick`].
//! - All date arithmetic is checked; stepping past the representable
//!   calendar is an error, never a wrap.
//! - Termination is evaluated on demand from the configured end instant
//!   and/or a step limit supplied by the caller.

use chrono::TimeDelta;
use steelpath_types::{SimulationTime, Timestamp};
use tracing::{debug, info};

use crate::config::{ConfigError, TimeConfig};

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Invalid time configuration (non-positive step, end not after start).
    #[error("invalid time configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },

    /// The time configuration could not be read.
    #[error("time configuration error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// Advancing would leave the representable calendar or overflow the step counter.
    #[error("clock overflow: cannot advance past {time} (step {step})")]
    Overflow {
        /// Instant the clock was at.
        time: Timestamp,
        /// Step the clock was at.
        step: u64,
    },
}

/// Clock tracking simulated time for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationClock {
    /// Instant the run starts at; restored by [`reset`](Self::reset).
    start: Timestamp,

    /// Current instant.
    current: Timestamp,

    /// Fixed, strictly positive step size.
    step_size: TimeDelta,

    /// Optional instant at which the run is over.
    end: Option<Timestamp>,

    /// Ticks taken since the start (0 before the first tick).
    step: u64,
}

impl SimulationClock {
    /// Create a clock starting at `start` and advancing by `step_size`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if `step_size` is not strictly
    /// positive, or if `end` is given and is not strictly after `start`.
    pub fn new(
        start: Timestamp,
        step_size: TimeDelta,
        end: Option<Timestamp>,
    ) -> Result<Self, ClockError> {
        if step_size <= TimeDelta::zero() {
            return Err(ClockError::InvalidConfig {
                reason: format!("time step must be strictly positive, got {step_size}"),
            });
        }
        if let Some(end) = end.filter(|end| *end <= start) {
            return Err(ClockError::InvalidConfig {
                reason: format!("end time {end} must be after start time {start}"),
            });
        }

        info!(
            %start,
            %step_size,
            end = ?end,
            "Simulation clock initialized"
        );

        Ok(Self {
            start,
            current: start,
            step_size,
            end,
            step: 0,
        })
    }

    /// Create a clock from the `time` section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Config`] if a date cannot be parsed, or
    /// [`ClockError::InvalidConfig`] if the values are inconsistent.
    pub fn from_config(config: &TimeConfig) -> Result<Self, ClockError> {
        Self::new(config.start()?, config.step_size()?, config.end()?)
    }

    /// Advance by one step. Returns the new simulation time.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Overflow`] if the next instant is not
    /// representable or the step counter would overflow. The clock is left
    /// unchanged in that case.
    pub fn tick(&mut self) -> Result<SimulationTime, ClockError> {
        let overflow = || ClockError::Overflow {
            time: self.current,
            step: self.step,
        };
        let next_time = self
            .current
            .checked_add_signed(self.step_size)
            .ok_or_else(overflow)?;
        let next_step = self.step.checked_add(1).ok_or_else(overflow)?;

        self.current = next_time;
        self.step = next_step;
        debug!(time = %self.current, step = self.step, "Clock ticked");
        Ok(self.now())
    }

    /// Return the current instant.
    pub const fn current_time(&self) -> Timestamp {
        self.current
    }

    /// Return the number of ticks taken so far.
    pub const fn current_step(&self) -> u64 {
        self.step
    }

    /// Return the current instant and step together.
    pub const fn now(&self) -> SimulationTime {
        SimulationTime::new(self.current, self.step)
    }

    /// Return the configured start instant.
    pub const fn start_time(&self) -> Timestamp {
        self.start
    }

    /// Return the configured end instant, if any.
    pub const fn end_time(&self) -> Option<Timestamp> {
        self.end
    }

    /// Return the configured step size.
    pub const fn step_size(&self) -> TimeDelta {
        self.step_size
    }

    /// Whether the run is over.
    ///
    /// True iff an end instant is configured and has been reached, or
    /// `max_steps` is given and that many ticks have been taken. With
    /// neither bound the clock never finishes.
    pub fn is_finished(&self, max_steps: Option<u64>) -> bool {
        if let Some(end) = self.end.filter(|end| self.current >= *end) {
            debug!(%end, "End time reached");
            return true;
        }
        if let Some(max_steps) = max_steps.filter(|max| self.step >= *max) {
            debug!(max_steps, "Maximum steps reached");
            return true;
        }
        false
    }

    /// Return to the start instant and step 0.
    ///
    /// Step size and end instant are kept.
    pub fn reset(&mut self) {
        self.current = self.start;
        self.step = 0;
        info!(start = %self.start, "Simulation clock reset");
    }
}
