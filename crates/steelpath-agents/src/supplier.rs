//! Raw material supplier (mines, scrap dealers).
//!
//! Offers its full capacity of one commodity every step. When the market
//! price stays above the expansion threshold the supplier invests and its
//! capacity grows by a fixed rate per step.

use serde::Deserialize;
use steelpath_core::agent::{Agent, AgentError, StepContext};
use steelpath_types::{AgentId, AgentStatus, CommodityId};
use tracing::debug;

use crate::error::{AgentConfigError, fraction, non_negative};
use crate::resolve_id;

const KIND: &str = "RawMaterialSupplier";

/// Configuration for one raw material supplier.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SupplierConfig {
    /// Agent id; a UUID is generated when absent.
    #[serde(default)]
    pub id: Option<String>,

    /// Commodity offered.
    #[serde(default = "default_commodity")]
    pub commodity: String,

    /// Region the supplier sells in; `None` for the global market.
    #[serde(default)]
    pub region: Option<String>,

    /// Quantity offered per step at the start of the run.
    #[serde(default = "default_capacity")]
    pub capacity: f64,

    /// Price above which capacity expands.
    #[serde(default = "default_expansion_price")]
    pub expansion_price: f64,

    /// Relative capacity growth per step while above the expansion price.
    #[serde(default = "default_expansion_rate")]
    pub expansion_rate: f64,
}

impl Default for SupplierConfig {
    fn default() -> Self {
        Self {
            id: None,
            commodity: default_commodity(),
            region: None,
            capacity: default_capacity(),
            expansion_price: default_expansion_price(),
            expansion_rate: default_expansion_rate(),
        }
    }
}

impl SupplierConfig {
    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`AgentConfigError::Invalid`] naming the first bad parameter.
    pub fn validate(&self) -> Result<(), AgentConfigError> {
        non_negative(KIND, "capacity", self.capacity)?;
        non_negative(KIND, "expansion_price", self.expansion_price)?;
        fraction(KIND, "expansion_rate", self.expansion_rate)
    }
}

/// A raw material supplier agent.
#[derive(Debug, Clone)]
pub struct RawMaterialSupplier {
    id: AgentId,
    commodity: CommodityId,
    region: Option<String>,
    capacity: f64,
    expansion_price: f64,
    expansion_rate: f64,
    last_price: Option<f64>,
}

impl RawMaterialSupplier {
    /// Build a supplier from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentConfigError::Invalid`] if a parameter is out of range.
    pub fn new(config: &SupplierConfig) -> Result<Self, AgentConfigError> {
        config.validate()?;
        Ok(Self {
            id: resolve_id(config.id.as_deref()),
            commodity: CommodityId::from(config.commodity.as_str()),
            region: config.region.clone(),
            capacity: config.capacity,
            expansion_price: config.expansion_price,
            expansion_rate: config.expansion_rate,
            last_price: None,
        })
    }

    /// Current capacity.
    pub const fn capacity(&self) -> f64 {
        self.capacity
    }
}

impl Agent for RawMaterialSupplier {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn kind(&self) -> &str {
        KIND
    }

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), AgentError> {
        let region = self.region.as_deref();
        let price = ctx.market.get_market_price(&self.commodity, region);
        if price.is_some_and(|price| price > self.expansion_price) {
            self.capacity *= 1.0 + self.expansion_rate;
            debug!(agent_id = %self.id, capacity = self.capacity, "Supplier expanding");
        }
        self.last_price = price;

        ctx.market
            .submit_supply_offer(&self.id, &self.commodity, self.capacity, region)?;
        Ok(())
    }

    fn status(&self) -> AgentStatus {
        let status = AgentStatus::nominal(self.id.clone(), KIND).with_metric("capacity", self.capacity);
        match self.last_price {
            Some(price) => status.with_metric("last_price", price),
            None => status,
        }
    }
}

// -----------------------------------------------------------------------
// Default value functions
// -----------------------------------------------------------------------

fn default_commodity() -> String {
    String::from("IRON_ORE")
}

const fn default_capacity() -> f64 {
    1500.0
}

const fn default_expansion_price() -> f64 {
    120.0
}

const fn default_expansion_rate() -> f64 {
    0.01
}
