//! Market identifiers and quotes.

use serde::{Deserialize, Serialize};

use crate::ids::CommodityId;

/// Identifies one market: a commodity, optionally restricted to a region.
///
/// A key without a region is the global market for that commodity and is
/// distinct from every regional market of the same commodity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarketKey {
    /// Commodity traded in this market.
    pub commodity: CommodityId,
    /// Region the market is restricted to, or `None` for the global market.
    #[serde(default)]
    pub region: Option<String>,
}

impl MarketKey {
    /// Create a market key.
    pub fn new(commodity: impl Into<CommodityId>, region: Option<&str>) -> Self {
        Self {
            commodity: commodity.into(),
            region: region.map(str::to_owned),
        }
    }

    /// The global (region-less) market for a commodity.
    pub fn global(commodity: impl Into<CommodityId>) -> Self {
        Self::new(commodity, None)
    }

    /// A regional market for a commodity.
    pub fn regional(commodity: impl Into<CommodityId>, region: &str) -> Self {
        Self::new(commodity, Some(region))
    }
}

impl core::fmt::Display for MarketKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}@{region}", self.commodity),
            None => write!(f, "{}", self.commodity),
        }
    }
}

/// Price and volume of one market after a clearing cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    /// Market this quote belongs to.
    pub market: MarketKey,
    /// Price committed by the clearing cycle.
    pub price: f64,
    /// Price before the clearing cycle, if the market had one.
    pub previous_price: Option<f64>,
    /// Total quantity offered during the cycle.
    pub total_supply: f64,
    /// Total quantity bid for during the cycle.
    pub total_demand: f64,
}

impl MarketQuote {
    /// Demand minus supply for the cycle.
    pub fn imbalance(&self) -> f64 {
        self.total_demand - self.total_supply
    }
}
