//! Agent spawner for seeding the simulation with its initial agents.
//!
//! Builds the plants, suppliers and buyers listed in the `agents` section
//! of `steelpath-config.yaml`. Agents are returned upstream first
//! (suppliers, then plants, then buyers), which is the order they step in.

use serde::Deserialize;
use steelpath_agents::{
    BuyerConfig, PlantConfig, RawMaterialSupplier, SteelBuyer, SteelPlant, SupplierConfig,
};
use steelpath_core::agent::Agent;
use tracing::info;

use crate::error::EngineError;

// -----------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------

/// Configuration for the agent spawner, loaded from `steelpath-config.yaml`.
///
/// A missing list spawns nothing of that kind; a missing section spawns
/// one agent of each kind with default parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpawnerConfig {
    /// Raw material suppliers.
    #[serde(default)]
    pub suppliers: Vec<SupplierConfig>,

    /// Steel plants.
    #[serde(default)]
    pub plants: Vec<PlantConfig>,

    /// Steel buyers.
    #[serde(default)]
    pub buyers: Vec<BuyerConfig>,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            suppliers: vec![SupplierConfig {
                id: Some(String::from("supplier_iron_ore")),
                ..SupplierConfig::default()
            }],
            plants: vec![PlantConfig {
                id: Some(String::from("plant_A")),
                ..PlantConfig::default()
            }],
            buyers: vec![BuyerConfig {
                id: Some(String::from("buyer_construction")),
                ..BuyerConfig::default()
            }],
        }
    }
}

// -----------------------------------------------------------------------
// Spawning
// -----------------------------------------------------------------------

/// Build every configured agent, upstream first.
///
/// # Errors
///
/// Returns [`EngineError::AgentConfig`] for the first agent whose
/// parameters are out of range.
pub fn spawn_agents(config: &SpawnerConfig) -> Result<Vec<Box<dyn Agent>>, EngineError> {
    let mut agents: Vec<Box<dyn Agent>> = Vec::with_capacity(
        config
            .suppliers
            .len()
            .saturating_add(config.plants.len())
            .saturating_add(config.buyers.len()),
    );

    for supplier in &config.suppliers {
        agents.push(Box::new(RawMaterialSupplier::new(supplier)?));
    }
    for plant in &config.plants {
        agents.push(Box::new(SteelPlant::new(plant)?));
    }
    for buyer in &config.buyers {
        agents.push(Box::new(SteelBuyer::new(buyer)?));
    }

    info!(
        suppliers = config.suppliers.len(),
        plants = config.plants.len(),
        buyers = config.buyers.len(),
        "Agents spawned"
    );
    Ok(agents)
}
