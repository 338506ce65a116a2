//! SteelPath simulation binary.
//!
//! Wires together configuration, the agent spawner and the simulation
//! engine, runs one simulation to completion and optionally writes the
//! step records to disk.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `steelpath-config.yaml` (or the path given
//!    as the first argument)
//! 2. Initialize structured logging (tracing)
//! 3. Create the simulation engine (clock, event queue, market)
//! 4. Spawn agents from the `agents` section
//! 5. Schedule the events from the `scheduled_events` section
//! 6. Run the simulation loop
//! 7. Write results and log the summary

mod error;
mod scenario;
mod spawner;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use steelpath_core::config::{ConfigError, SimulationConfig};
use steelpath_core::engine::SimulationEngine;
use steelpath_core::runner::ProgressLogger;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::scenario::{OutputConfig, ScheduledEventConfig};
use crate::spawner::SpawnerConfig;

/// Default config file, looked up in the working directory.
const DEFAULT_CONFIG_PATH: &str = "steelpath-config.yaml";

/// Log a progress line every this many steps.
const PROGRESS_EVERY: u64 = 10;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any initialization step or the simulation itself fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);

    // 1. Load configuration.
    let raw = read_raw_config(&config_path)?;
    let config = load_config(raw.as_ref())?;

    // 2. Initialize structured logging. RUST_LOG wins over the config level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(
        config_path = %config_path.display(),
        name = %config.simulation.name,
        seed = config.simulation.seed,
        "steelpath-engine starting"
    );

    let spawner_config: SpawnerConfig = load_section(raw.as_ref(), "agents")?.unwrap_or_default();
    let scheduled_events: Vec<ScheduledEventConfig> =
        load_section(raw.as_ref(), "scheduled_events")?.unwrap_or_default();
    let output: OutputConfig = load_section(raw.as_ref(), "output")?.unwrap_or_default();

    // 3. Create the engine.
    let mut engine = SimulationEngine::new(config)?;

    // 4. Spawn agents.
    for agent in spawner::spawn_agents(&spawner_config)? {
        engine.add_agent(agent)?;
    }

    // 5. Schedule configured events.
    scenario::schedule_events(&mut engine, &scheduled_events)?;

    // 6. Run.
    let mut progress = ProgressLogger::new(PROGRESS_EVERY);
    let steps = engine.run_simulation_with(&mut progress)?.len();

    // 7. Write results.
    if let Some(path) = &output.results_path {
        scenario::write_results(path, engine.results())?;
    }
    info!(steps, "steelpath-engine finished");

    Ok(())
}

/// Read and parse the whole config file once, if it exists.
///
/// A missing or empty file yields `None`, which means "all defaults".
fn read_raw_config(path: &Path) -> Result<Option<serde_yml::Value>, EngineError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(ConfigError::from)?;
    if contents.trim().is_empty() {
        return Ok(None);
    }
    let raw = serde_yml::from_str(&contents).map_err(ConfigError::from)?;
    Ok(Some(raw))
}

/// Build the simulation configuration from the parsed file, falling back
/// to defaults when there is none.
fn load_config(raw: Option<&serde_yml::Value>) -> Result<SimulationConfig, EngineError> {
    let config = match raw {
        Some(raw) => SimulationConfig::from_value(raw.clone())?,
        None => SimulationConfig::default(),
    };
    Ok(config)
}

/// Deserialize one top-level section of the config file, if present.
fn load_section<T: DeserializeOwned>(
    raw: Option<&serde_yml::Value>,
    section: &'static str,
) -> Result<Option<T>, EngineError> {
    let Some(value) = raw.and_then(|raw| raw.get(section)) else {
        return Ok(None);
    };
    serde_yml::from_value(value.clone())
        .map(Some)
        .map_err(|e| EngineError::Section {
            section,
            message: e.to_string(),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = include_str!("../../../steelpath-config.yaml");

    #[test]
    fn sample_config_loads_every_section() {
        let config = SimulationConfig::parse(SAMPLE).unwrap();
        assert!(config.time.max_steps.is_some());

        let raw: serde_yml::Value = serde_yml::from_str(SAMPLE).unwrap();
        let agents: SpawnerConfig = load_section(Some(&raw), "agents").unwrap().unwrap();
        assert!(!agents.plants.is_empty());
        let events: Vec<ScheduledEventConfig> =
            load_section(Some(&raw), "scheduled_events").unwrap().unwrap();
        assert!(!events.is_empty());
    }

    #[test]
    fn config_comes_from_the_parsed_document() {
        let raw: serde_yml::Value = serde_yml::from_str(SAMPLE).unwrap();
        let config = load_config(Some(&raw)).unwrap();
        assert_eq!(config, SimulationConfig::parse(SAMPLE).unwrap());
        assert_eq!(load_config(None).unwrap(), SimulationConfig::default());

        let impossible: serde_yml::Value =
            serde_yml::from_str("time:\n  time_step_days: 0\n").unwrap();
        assert!(matches!(
            load_config(Some(&impossible)),
            Err(EngineError::Config { .. })
        ));
    }

    #[test]
    fn missing_config_file_means_defaults() {
        let path = std::env::temp_dir().join("steelpath-no-such-config.yaml");
        assert!(read_raw_config(&path).unwrap().is_none());
    }

    #[test]
    fn missing_section_is_none() {
        let raw: serde_yml::Value = serde_yml::from_str("simulation: {seed: 1}").unwrap();
        let output: Option<OutputConfig> = load_section(Some(&raw), "output").unwrap();
        assert!(output.is_none());
        let nothing: Option<OutputConfig> = load_section(None, "output").unwrap();
        assert!(nothing.is_none());
    }

    #[test]
    fn malformed_section_names_the_section() {
        let raw: serde_yml::Value = serde_yml::from_str("agents: [1, 2]").unwrap();
        let err = load_section::<SpawnerConfig>(Some(&raw), "agents").unwrap_err();
        assert!(err.to_string().contains("`agents`"));
    }

    #[test]
    fn sample_config_runs_end_to_end() {
        let config = SimulationConfig::parse(SAMPLE).unwrap();
        let raw: serde_yml::Value = serde_yml::from_str(SAMPLE).unwrap();
        let agents: SpawnerConfig = load_section(Some(&raw), "agents").unwrap().unwrap();
        let events: Vec<ScheduledEventConfig> =
            load_section(Some(&raw), "scheduled_events").unwrap().unwrap();

        let mut engine = SimulationEngine::new(config).unwrap();
        for agent in spawner::spawn_agents(&agents).unwrap() {
            engine.add_agent(agent).unwrap();
        }
        scenario::schedule_events(&mut engine, &events).unwrap();
        let records = engine.run_simulation().unwrap();
        assert!(!records.is_empty());
        assert!(records.iter().all(|r| !r.has_failures()));
    }
}
