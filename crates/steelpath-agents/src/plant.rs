//! Integrated steel plant.
//!
//! A plant turns iron ore into one steel product. Every step it offers
//! `capacity * utilization` tonnes of product and bids for the ore that
//! output needs, drawing on its ore stock first. Utilization follows the
//! product price: above breakeven the plant ramps up, below it throttles
//! down to a minimum run rate.
//!
//! While in maintenance the plant neither offers nor bids.

use serde::Deserialize;
use steelpath_core::agent::{Agent, AgentError, EventContext, StepContext};
use steelpath_types::{AgentId, AgentStatus, CommodityId, Event};
use tracing::{debug, info};

use crate::error::{AgentConfigError, fraction, non_negative};
use crate::event_types::{MAINTENANCE_END, MAINTENANCE_START, RAW_MATERIAL_DELIVERY};
use crate::{STATUS_MAINTENANCE, optional_u64, required_f64, resolve_id};

const KIND: &str = "SteelPlant";

/// Configuration for one steel plant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlantConfig {
    /// Agent id; a UUID is generated when absent.
    #[serde(default)]
    pub id: Option<String>,

    /// Product the plant sells.
    #[serde(default = "default_product")]
    pub product: String,

    /// Raw material the plant buys.
    #[serde(default = "default_ore")]
    pub ore: String,

    /// Region the plant trades in; `None` for the global markets.
    #[serde(default)]
    pub region: Option<String>,

    /// Nameplate output per step, in tonnes.
    #[serde(default = "default_capacity")]
    pub capacity: f64,

    /// Utilization at the start of the run.
    #[serde(default = "default_initial_utilization")]
    pub initial_utilization: f64,

    /// Lowest utilization the plant throttles down to.
    #[serde(default = "default_min_utilization")]
    pub min_utilization: f64,

    /// Utilization change per step in response to price.
    #[serde(default = "default_utilization_step")]
    pub utilization_step: f64,

    /// Product price at which the plant neither ramps up nor down.
    #[serde(default = "default_breakeven_price")]
    pub breakeven_price: f64,

    /// Tonnes of ore per tonne of product.
    #[serde(default = "default_ore_per_tonne")]
    pub ore_per_tonne: f64,

    /// Ore on hand at the start of the run.
    #[serde(default)]
    pub initial_ore_stock: f64,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            id: None,
            product: default_product(),
            ore: default_ore(),
            region: None,
            capacity: default_capacity(),
            initial_utilization: default_initial_utilization(),
            min_utilization: default_min_utilization(),
            utilization_step: default_utilization_step(),
            breakeven_price: default_breakeven_price(),
            ore_per_tonne: default_ore_per_tonne(),
            initial_ore_stock: 0.0,
        }
    }
}

impl PlantConfig {
    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`AgentConfigError::Invalid`] naming the first bad parameter.
    pub fn validate(&self) -> Result<(), AgentConfigError> {
        non_negative(KIND, "capacity", self.capacity)?;
        non_negative(KIND, "breakeven_price", self.breakeven_price)?;
        non_negative(KIND, "ore_per_tonne", self.ore_per_tonne)?;
        non_negative(KIND, "initial_ore_stock", self.initial_ore_stock)?;
        fraction(KIND, "utilization_step", self.utilization_step)?;
        fraction(KIND, "min_utilization", self.min_utilization)?;
        fraction(KIND, "initial_utilization", self.initial_utilization)?;
        if self.initial_utilization < self.min_utilization {
            return Err(AgentConfigError::Invalid {
                kind: KIND,
                reason: format!(
                    "initial_utilization {} is below min_utilization {}",
                    self.initial_utilization, self.min_utilization
                ),
            });
        }
        Ok(())
    }
}

/// A steel plant agent.
#[derive(Debug, Clone)]
pub struct SteelPlant {
    id: AgentId,
    product: CommodityId,
    ore: CommodityId,
    region: Option<String>,
    capacity: f64,
    utilization: f64,
    min_utilization: f64,
    utilization_step: f64,
    breakeven_price: f64,
    ore_per_tonne: f64,
    ore_stock: f64,
    last_output: f64,
    offline: bool,
    /// Offline steps left; `None` means until `MAINTENANCE_END`.
    maintenance_remaining: Option<u64>,
}

impl SteelPlant {
    /// Build a plant from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentConfigError::Invalid`] if a parameter is out of range.
    pub fn new(config: &PlantConfig) -> Result<Self, AgentConfigError> {
        config.validate()?;
        Ok(Self {
            id: resolve_id(config.id.as_deref()),
            product: CommodityId::from(config.product.as_str()),
            ore: CommodityId::from(config.ore.as_str()),
            region: config.region.clone(),
            capacity: config.capacity,
            utilization: config.initial_utilization,
            min_utilization: config.min_utilization,
            utilization_step: config.utilization_step,
            breakeven_price: config.breakeven_price,
            ore_per_tonne: config.ore_per_tonne,
            ore_stock: config.initial_ore_stock,
            last_output: 0.0,
            offline: false,
            maintenance_remaining: None,
        })
    }

    /// Current utilization in `[min_utilization, 1]`.
    pub const fn utilization(&self) -> f64 {
        self.utilization
    }

    /// Ore on hand.
    pub const fn ore_stock(&self) -> f64 {
        self.ore_stock
    }

    /// Output offered in the most recent step.
    pub const fn last_output(&self) -> f64 {
        self.last_output
    }

    /// Whether the plant is in maintenance.
    pub const fn is_offline(&self) -> bool {
        self.offline
    }

    fn adjust_utilization(&mut self, price: Option<f64>) {
        let Some(price) = price else {
            return;
        };
        if price > self.breakeven_price {
            self.utilization = (self.utilization + self.utilization_step).min(1.0);
        } else if price < self.breakeven_price {
            self.utilization = (self.utilization - self.utilization_step).max(self.min_utilization);
        }
    }

    /// Count down a timed maintenance window. Returns whether the plant is
    /// still offline for this step.
    fn tick_maintenance(&mut self) -> bool {
        if !self.offline {
            return false;
        }
        match self.maintenance_remaining {
            Some(0) => {
                self.end_maintenance();
                false
            }
            Some(remaining) => {
                self.maintenance_remaining = Some(remaining.saturating_sub(1));
                true
            }
            None => true,
        }
    }

    fn end_maintenance(&mut self) {
        self.offline = false;
        self.maintenance_remaining = None;
        info!(agent_id = %self.id, "Plant back online");
    }
}

impl Agent for SteelPlant {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn kind(&self) -> &str {
        KIND
    }

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), AgentError> {
        if self.tick_maintenance() {
            self.last_output = 0.0;
            debug!(agent_id = %self.id, step = ctx.now.step, "Plant offline, skipping market");
            return Ok(());
        }

        let price = ctx
            .market
            .get_market_price(&self.product, self.region.as_deref());
        self.adjust_utilization(price);

        let output = self.capacity * self.utilization;
        let ore_needed = output * self.ore_per_tonne;
        let from_stock = ore_needed.min(self.ore_stock);
        self.ore_stock -= from_stock;
        let ore_bid = ore_needed - from_stock;

        let region = self.region.as_deref();
        ctx.market
            .submit_supply_offer(&self.id, &self.product, output, region)?;
        ctx.market
            .submit_demand_bid(&self.id, &self.ore, ore_bid, region)?;
        self.last_output = output;

        debug!(
            agent_id = %self.id,
            utilization = self.utilization,
            output,
            ore_bid,
            ore_stock = self.ore_stock,
            "Plant stepped"
        );
        Ok(())
    }

    fn handle_event(
        &mut self,
        event: &Event,
        _ctx: &mut EventContext<'_>,
    ) -> Result<(), AgentError> {
        match event.event_type.as_str() {
            MAINTENANCE_START => {
                let duration = optional_u64(event, "duration_steps")?;
                self.offline = true;
                self.maintenance_remaining = duration;
                info!(
                    agent_id = %self.id,
                    duration_steps = ?self.maintenance_remaining,
                    "Plant entering maintenance"
                );
            }
            MAINTENANCE_END => {
                if self.offline {
                    self.end_maintenance();
                }
            }
            RAW_MATERIAL_DELIVERY => {
                let quantity = required_f64(event, "quantity")?;
                if quantity < 0.0 {
                    return Err(AgentError::InvalidEvent {
                        event_type: event.event_type.clone(),
                        reason: format!("negative quantity {quantity}"),
                    });
                }
                self.ore_stock += quantity;
                info!(agent_id = %self.id, quantity, ore_stock = self.ore_stock, "Ore delivered");
            }
            other => debug!(agent_id = %self.id, event_type = other, "Ignoring event"),
        }
        Ok(())
    }

    fn status(&self) -> AgentStatus {
        let status = AgentStatus::nominal(self.id.clone(), KIND)
            .with_metric("utilization", self.utilization)
            .with_metric("output", self.last_output)
            .with_metric("ore_stock", self.ore_stock)
            .with_metric("offline", if self.offline { 1.0 } else { 0.0 });
        if self.offline {
            status.with_status(STATUS_MAINTENANCE)
        } else {
            status
        }
    }
}

// -----------------------------------------------------------------------
// Default value functions
// -----------------------------------------------------------------------

fn default_product() -> String {
    String::from("REBAR")
}

fn default_ore() -> String {
    String::from("IRON_ORE")
}

const fn default_capacity() -> f64 {
    1000.0
}

const fn default_initial_utilization() -> f64 {
    0.8
}

const fn default_min_utilization() -> f64 {
    0.3
}

const fn default_utilization_step() -> f64 {
    0.05
}

const fn default_breakeven_price() -> f64 {
    95.0
}

const fn default_ore_per_tonne() -> f64 {
    1.6
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;
    use steelpath_core::config::MarketConfig;
    use steelpath_core::events::Outbox;
    use steelpath_core::market::MarketModel;
    use steelpath_types::{MarketKey, SimulationTime};

    use super::*;

    fn now(step: u64) -> SimulationTime {
        SimulationTime::new(
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            step,
        )
    }

    fn plant() -> SteelPlant {
        SteelPlant::new(&PlantConfig {
            id: Some("plant-1".to_owned()),
            ..PlantConfig::default()
        })
        .unwrap()
    }

    fn step(plant: &mut SteelPlant, market: &mut MarketModel) {
        let mut rng = StdRng::seed_from_u64(1);
        let mut outbox = Outbox::new();
        let mut ctx = StepContext {
            now: now(1),
            market,
            rng: &mut rng,
            outbox: &mut outbox,
        };
        plant.step(&mut ctx).unwrap();
    }

    fn deliver(plant: &mut SteelPlant, event_type: &str, payload: serde_json::Value) -> Result<(), AgentError> {
        let event = Event {
            time: now(0).time,
            target: plant.id().clone(),
            event_type: event_type.to_owned(),
            payload,
            sequence: 0,
        };
        let mut outbox = Outbox::new();
        let mut ctx = EventContext {
            now: now(0),
            outbox: &mut outbox,
        };
        plant.handle_event(&event, &mut ctx)
    }

    fn rebar() -> MarketKey {
        MarketKey::global("REBAR")
    }

    #[test]
    fn offers_output_and_bids_ore() {
        let mut market = MarketModel::new(&MarketConfig::default());
        let mut plant = plant();
        step(&mut plant, &mut market);

        let book = market.book(&rebar()).unwrap();
        assert_eq!(book.supply_of(plant.id()), Some(800.0));
        let ore = market.book(&MarketKey::global("IRON_ORE")).unwrap();
        assert!((ore.demand_of(plant.id()).unwrap() - 1280.0).abs() < 1e-9);
    }

    #[test]
    fn high_price_ramps_up_to_full_capacity() {
        let mut market = MarketModel::new(&MarketConfig::default());
        market.set_price(rebar(), 150.0).unwrap();
        let mut plant = plant();
        for _ in 0..10 {
            step(&mut plant, &mut market);
        }
        assert_eq!(plant.utilization(), 1.0);
    }

    #[test]
    fn low_price_throttles_to_minimum() {
        let mut market = MarketModel::new(&MarketConfig::default());
        market.set_price(rebar(), 50.0).unwrap();
        let mut plant = plant();
        for _ in 0..20 {
            step(&mut plant, &mut market);
        }
        assert!((plant.utilization() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn maintenance_takes_plant_offline_for_duration() {
        let mut market = MarketModel::new(&MarketConfig::default());
        let mut plant = plant();
        deliver(&mut plant, MAINTENANCE_START, json!({"duration_steps": 2})).unwrap();
        assert_eq!(plant.status().status, STATUS_MAINTENANCE);

        step(&mut plant, &mut market);
        step(&mut plant, &mut market);
        assert!(market.book(&rebar()).is_none());
        assert_eq!(plant.last_output(), 0.0);

        step(&mut plant, &mut market);
        assert!(!plant.is_offline());
        assert!(market.book(&rebar()).is_some());
    }

    #[test]
    fn open_ended_maintenance_waits_for_end_event() {
        let mut market = MarketModel::new(&MarketConfig::default());
        let mut plant = plant();
        deliver(&mut plant, MAINTENANCE_START, json!(null)).unwrap();
        for _ in 0..5 {
            step(&mut plant, &mut market);
        }
        assert!(plant.is_offline());

        deliver(&mut plant, MAINTENANCE_END, json!(null)).unwrap();
        step(&mut plant, &mut market);
        assert!(!plant.is_offline());
        assert_eq!(plant.status().metrics["offline"], 0.0);
    }

    #[test]
    fn non_integer_maintenance_duration_is_rejected() {
        let mut market = MarketModel::new(&MarketConfig::default());
        let mut plant = plant();
        for payload in [
            json!({"duration_steps": 2.0}),
            json!({"duration_steps": "3"}),
            json!({"duration_steps": -1}),
        ] {
            let err = deliver(&mut plant, MAINTENANCE_START, payload).unwrap_err();
            assert!(matches!(err, AgentError::InvalidEvent { .. }));
            assert!(!plant.is_offline());
        }

        step(&mut plant, &mut market);
        assert!(market.book(&rebar()).is_some());
    }

    #[test]
    fn delivered_ore_reduces_ore_bid() {
        let mut market = MarketModel::new(&MarketConfig::default());
        let mut plant = plant();
        deliver(&mut plant, RAW_MATERIAL_DELIVERY, json!({"quantity": 1000})).unwrap();
        assert_eq!(plant.ore_stock(), 1000.0);

        step(&mut plant, &mut market);
        let ore = market.book(&MarketKey::global("IRON_ORE")).unwrap();
        assert!((ore.demand_of(plant.id()).unwrap() - 280.0).abs() < 1e-9);
        assert_eq!(plant.ore_stock(), 0.0);
    }

    #[test]
    fn malformed_delivery_is_rejected() {
        let mut plant = plant();
        assert!(deliver(&mut plant, RAW_MATERIAL_DELIVERY, json!({})).is_err());
        assert!(deliver(&mut plant, RAW_MATERIAL_DELIVERY, json!({"quantity": -5})).is_err());
        assert_eq!(plant.ore_stock(), 0.0);
    }

    #[test]
    fn unknown_events_are_ignored() {
        let mut plant = plant();
        assert!(deliver(&mut plant, "PRICE_UPDATE", json!({"price": 750})).is_ok());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad = PlantConfig {
            initial_utilization: 0.1,
            min_utilization: 0.3,
            ..PlantConfig::default()
        };
        assert!(SteelPlant::new(&bad).is_err());
        let negative = PlantConfig {
            capacity: -1.0,
            ..PlantConfig::default()
        };
        assert!(SteelPlant::new(&negative).is_err());
    }

    #[test]
    fn missing_id_is_generated() {
        let a = SteelPlant::new(&PlantConfig::default()).unwrap();
        let b = SteelPlant::new(&PlantConfig::default()).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
