//! Steel buyer (construction, automotive, distributors).
//!
//! Demand starts at a base level and compounds by a growth rate every step.
//! Each step's bid is that trend scaled by random noise from the run's RNG
//! and cut back when the price sits above the buyer's reference price.

use rand::Rng;
use serde::Deserialize;
use steelpath_core::agent::{Agent, AgentError, EventContext, StepContext};
use steelpath_types::{AgentId, AgentStatus, CommodityId, Event};
use tracing::{debug, info};

use crate::error::{AgentConfigError, fraction, non_negative};
use crate::event_types::PRICE_UPDATE;
use crate::{required_f64, resolve_id};

const KIND: &str = "SteelBuyer";

/// Configuration for one steel buyer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuyerConfig {
    /// Agent id; a UUID is generated when absent.
    #[serde(default)]
    pub id: Option<String>,

    /// Commodity bought.
    #[serde(default = "default_commodity")]
    pub commodity: String,

    /// Region the buyer buys in; `None` for the global market.
    #[serde(default)]
    pub region: Option<String>,

    /// Demand per step at the start of the run.
    #[serde(default = "default_base_demand")]
    pub base_demand: f64,

    /// Relative demand growth per step.
    #[serde(default = "default_growth_rate")]
    pub growth_rate: f64,

    /// Half-width of the uniform noise applied to each bid, as a fraction.
    #[serde(default = "default_volatility")]
    pub volatility: f64,

    /// Price above which the buyer starts cutting demand.
    #[serde(default = "default_reference_price")]
    pub reference_price: f64,

    /// Demand cut per unit of relative price excess over the reference.
    #[serde(default = "default_price_sensitivity")]
    pub price_sensitivity: f64,
}

impl Default for BuyerConfig {
    fn default() -> Self {
        Self {
            id: None,
            commodity: default_commodity(),
            region: None,
            base_demand: default_base_demand(),
            growth_rate: default_growth_rate(),
            volatility: default_volatility(),
            reference_price: default_reference_price(),
            price_sensitivity: default_price_sensitivity(),
        }
    }
}

impl BuyerConfig {
    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`AgentConfigError::Invalid`] naming the first bad parameter.
    pub fn validate(&self) -> Result<(), AgentConfigError> {
        non_negative(KIND, "base_demand", self.base_demand)?;
        non_negative(KIND, "price_sensitivity", self.price_sensitivity)?;
        fraction(KIND, "growth_rate", self.growth_rate)?;
        fraction(KIND, "volatility", self.volatility)?;
        if self.reference_price.is_finite() && self.reference_price > 0.0 {
            Ok(())
        } else {
            Err(AgentConfigError::Invalid {
                kind: KIND,
                reason: format!("reference_price must be positive, got {}", self.reference_price),
            })
        }
    }
}

/// A steel buyer agent.
#[derive(Debug, Clone)]
pub struct SteelBuyer {
    id: AgentId,
    commodity: CommodityId,
    region: Option<String>,
    trend_demand: f64,
    growth_rate: f64,
    volatility: f64,
    reference_price: f64,
    price_sensitivity: f64,
    last_bid: f64,
}

impl SteelBuyer {
    /// Build a buyer from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentConfigError::Invalid`] if a parameter is out of range.
    pub fn new(config: &BuyerConfig) -> Result<Self, AgentConfigError> {
        config.validate()?;
        Ok(Self {
            id: resolve_id(config.id.as_deref()),
            commodity: CommodityId::from(config.commodity.as_str()),
            region: config.region.clone(),
            trend_demand: config.base_demand,
            growth_rate: config.growth_rate,
            volatility: config.volatility,
            reference_price: config.reference_price,
            price_sensitivity: config.price_sensitivity,
            last_bid: 0.0,
        })
    }

    /// Demand before noise and price response.
    pub const fn trend_demand(&self) -> f64 {
        self.trend_demand
    }

    /// Quantity bid in the most recent step.
    pub const fn last_bid(&self) -> f64 {
        self.last_bid
    }

    /// Price above which demand is cut.
    pub const fn reference_price(&self) -> f64 {
        self.reference_price
    }

    /// Fraction of demand kept at `price`, in `[0, 1]`.
    fn price_response(&self, price: Option<f64>) -> f64 {
        match price {
            Some(price) if price > self.reference_price => {
                let excess = (price - self.reference_price) / self.reference_price;
                (1.0 - self.price_sensitivity * excess).clamp(0.0, 1.0)
            }
            _ => 1.0,
        }
    }
}

impl Agent for SteelBuyer {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn kind(&self) -> &str {
        KIND
    }

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), AgentError> {
        self.trend_demand *= 1.0 + self.growth_rate;

        let noise = if self.volatility > 0.0 {
            1.0 + ctx.rng.random_range(-self.volatility..=self.volatility)
        } else {
            1.0
        };
        let region = self.region.as_deref();
        let price = ctx.market.get_market_price(&self.commodity, region);
        let bid = (self.trend_demand * noise * self.price_response(price)).max(0.0);

        ctx.market
            .submit_demand_bid(&self.id, &self.commodity, bid, region)?;
        self.last_bid = bid;
        debug!(agent_id = %self.id, trend = self.trend_demand, bid, price = ?price, "Buyer stepped");
        Ok(())
    }

    fn handle_event(
        &mut self,
        event: &Event,
        _ctx: &mut EventContext<'_>,
    ) -> Result<(), AgentError> {
        if event.event_type != PRICE_UPDATE {
            debug!(agent_id = %self.id, event_type = %event.event_type, "Ignoring event");
            return Ok(());
        }
        let price = required_f64(event, "price")?;
        if price <= 0.0 {
            return Err(AgentError::InvalidEvent {
                event_type: event.event_type.clone(),
                reason: format!("reference price must be positive, got {price}"),
            });
        }
        info!(agent_id = %self.id, old = self.reference_price, new = price, "Reference price updated");
        self.reference_price = price;
        Ok(())
    }

    fn status(&self) -> AgentStatus {
        AgentStatus::nominal(self.id.clone(), KIND)
            .with_metric("trend_demand", self.trend_demand)
            .with_metric("last_bid", self.last_bid)
            .with_metric("reference_price", self.reference_price)
    }
}

// -----------------------------------------------------------------------
// Default value functions
// -----------------------------------------------------------------------

fn default_commodity() -> String {
    String::from("REBAR")
}

const fn default_base_demand() -> f64 {
    900.0
}

const fn default_growth_rate() -> f64 {
    0.002
}

const fn default_volatility() -> f64 {
    0.05
}

const fn default_reference_price() -> f64 {
    100.0
}

const fn default_price_sensitivity() -> f64 {
    0.8
}
