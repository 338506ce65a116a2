//! Scenario sections of the config file: scheduled events and output.
//!
//! ```yaml
//! scheduled_events:
//!   - time: "2024-01-10"
//!     target: plant_A
//!     event_type: MAINTENANCE_START
//!     payload: { duration_steps: 5 }
//! output:
//!   results_path: results.json
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use steelpath_core::config::parse_timestamp;
use steelpath_core::engine::SimulationEngine;
use steelpath_types::StepRecord;
use tracing::info;

use crate::error::EngineError;

/// One event to inject before the run starts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScheduledEventConfig {
    /// When the event is due (ISO-8601 date or date-time).
    pub time: String,

    /// Id of the receiving agent.
    pub target: String,

    /// Event tag.
    pub event_type: String,

    /// Free-form payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Where results go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OutputConfig {
    /// File to write the step records to as pretty JSON. Nothing is
    /// written when absent.
    #[serde(default)]
    pub results_path: Option<PathBuf>,
}

/// Schedule every configured event on the engine, in file order.
///
/// # Errors
///
/// Returns [`EngineError::Config`] if an event time cannot be parsed, or
/// [`EngineError::Simulation`] if the event cannot be queued.
pub fn schedule_events(
    engine: &mut SimulationEngine,
    events: &[ScheduledEventConfig],
) -> Result<(), EngineError> {
    for event in events {
        let time = parse_timestamp(&event.time)?;
        engine.schedule_event(
            time,
            event.target.as_str(),
            &event.event_type,
            event.payload.clone(),
        )?;
    }
    info!(count = events.len(), "Scheduled events loaded");
    Ok(())
}

/// Write step records to `path` as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`EngineError::Output`] if serialization or the write fails.
pub fn write_results(path: &Path, records: &[StepRecord]) -> Result<(), EngineError> {
    let json = serde_json::to_string_pretty(records).map_err(|e| EngineError::Output {
        message: format!("failed to serialize results: {e}"),
    })?;
    std::fs::write(path, json).map_err(|e| EngineError::Output {
        message: format!("failed to write {}: {e}", path.display()),
    })?;
    info!(path = %path.display(), steps = records.len(), "Results written");
    Ok(())
}
