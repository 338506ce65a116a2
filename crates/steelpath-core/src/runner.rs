//! Run-loop plumbing shared by the engine and its callers.
//!
//! The tick loop itself lives in
//! [`SimulationEngine::run_simulation_with`](crate::engine::SimulationEngine::run_simulation_with).
//! This module holds what sits around it:
//!
//! - **Observers**: [`StepObserver`] is called after every completed step,
//!   e.g. to stream records or log progress.
//! - **Termination**: [`SimulationEndReason`] says which bound ended a run.
//! - **Summary**: [`SimulationResult`] and [`log_simulation_end`].

use std::collections::BTreeMap;

use serde::Serialize;
use steelpath_types::{MarketKey, StepRecord, Timestamp};
use tracing::info;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationEndReason {
    /// The clock reached its configured end instant.
    EndTimeReached,
    /// The configured number of steps was taken.
    MaxStepsReached,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    /// Why the run ended.
    pub end_reason: SimulationEndReason,
    /// Number of steps executed.
    pub total_steps: u64,
    /// Simulated instant after the last step.
    pub final_time: Timestamp,
    /// Committed prices after the last step.
    #[serde(serialize_with = "serialize_prices")]
    pub final_prices: BTreeMap<MarketKey, f64>,
    /// Failures recorded across all steps.
    pub total_failures: usize,
}

/// Market keys are not strings, so serialize the table as `"key": price`.
fn serialize_prices<S: serde::Serializer>(
    prices: &BTreeMap<MarketKey, f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(prices.iter().map(|(market, price)| (market.to_string(), price)))
}

/// Callback invoked after each step completes.
pub trait StepObserver {
    /// Called with the record of the step that just finished.
    fn on_step(&mut self, record: &StepRecord);
}

/// An observer that does nothing.
pub struct NoOpObserver;

impl StepObserver for NoOpObserver {
    fn on_step(&mut self, _record: &StepRecord) {}
}

/// Logs a progress line every `every` steps.
#[derive(Debug, Clone, Copy)]
pub struct ProgressLogger {
    every: u64,
}

impl ProgressLogger {
    /// Log every `every` steps. Zero disables logging.
    pub const fn new(every: u64) -> Self {
        Self { every }
    }
}

impl StepObserver for ProgressLogger {
    fn on_step(&mut self, record: &StepRecord) {
        if self.every == 0 || record.step.checked_rem(self.every) != Some(0) {
            return;
        }
        info!(
            step = record.step,
            time = %record.time,
            events = record.processed_events.len(),
            markets = record.prices.len(),
            failures = record.failures.len(),
            "Simulation progress"
        );
    }
}

impl<F: FnMut(&StepRecord)> StepObserver for F {
    fn on_step(&mut self, record: &StepRecord) {
        self(record);
    }
}

/// Log the simulation end sequence.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(
        reason = ?result.end_reason,
        total_steps = result.total_steps,
        final_time = %result.final_time,
        markets = result.final_prices.len(),
        failures = result.total_failures,
        "Simulation ended"
    );
    for (market, price) in &result.final_prices {
        info!(%market, price, "Final price");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn record(step: u64) -> StepRecord {
        StepRecord {
            step,
            time: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            processed_events: Vec::new(),
            prices: Vec::new(),
            agents: Vec::new(),
            failures: Vec::new(),
        }
    }

    #[test]
    fn closures_are_observers() {
        let mut seen = Vec::new();
        {
            let mut observer = |r: &StepRecord| seen.push(r.step);
            let observer: &mut dyn StepObserver = &mut observer;
            observer.on_step(&record(1));
            observer.on_step(&record(2));
        }
        assert_eq!(seen, [1, 2]);
    }

    #[test]
    fn progress_logger_tolerates_zero_interval() {
        let mut logger = ProgressLogger::new(0);
        logger.on_step(&record(0));
        logger.on_step(&record(10));
    }

    #[test]
    fn result_serializes_prices_by_display_key() {
        let mut final_prices = BTreeMap::new();
        final_prices.insert(MarketKey::regional("REBAR", "EU"), 101.5);
        final_prices.insert(MarketKey::global("IRON_ORE"), 90.0);
        let result = SimulationResult {
            end_reason: SimulationEndReason::MaxStepsReached,
            total_steps: 5,
            final_time: record(5).time,
            final_prices,
            total_failures: 0,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["end_reason"], "max_steps_reached");
        assert_eq!(json["final_prices"]["REBAR@EU"], 101.5);
        assert_eq!(json["final_prices"]["IRON_ORE"], 90.0);
        log_simulation_end(&result);
    }
}
