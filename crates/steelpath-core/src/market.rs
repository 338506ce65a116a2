//! Commodity market with price-adjustment clearing.
//!
//! Agents post supply offers and demand bids per [`MarketKey`] during their
//! step. Once every agent has stepped, the engine calls
//! [`MarketModel::clear_market`], which moves each active market's price
//! according to the configured [`ClearingStrategy`] and empties the books.
//!
//! # Design Principles
//!
//! - Prices never drop below `min_price`, whatever the strategy proposes.
//! - A market with no activity keeps its price; a market seen for the first
//!   time starts from `default_price`.
//! - One offer and one bid per agent per market per tick; the last write
//!   wins.
//! - No units are matched. Clearing only moves prices.

use std::collections::BTreeMap;
use std::fmt;

use steelpath_types::{AgentId, CommodityId, FailurePhase, MarketKey, MarketQuote, StepFailure};
use tracing::{debug, info, warn};

use crate::config::{ClearingMechanism, InitialPrice, MarketConfig};

/// Errors that can occur during market operations.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    /// An offer or bid quantity was negative or not finite.
    #[error("invalid quantity {quantity} from {agent_id} on {market}")]
    InvalidQuantity {
        /// Agent that submitted the quantity.
        agent_id: AgentId,
        /// Market the quantity was submitted to.
        market: MarketKey,
        /// The rejected quantity.
        quantity: f64,
    },

    /// A price was not finite.
    #[error("invalid price {price} on {market}")]
    InvalidPrice {
        /// Market the price belongs to.
        market: MarketKey,
        /// The rejected price.
        price: f64,
    },
}

/// Pending offers and bids for one market, keyed by agent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBook {
    supply: BTreeMap<AgentId, f64>,
    demand: BTreeMap<AgentId, f64>,
}

impl OrderBook {
    /// Sum of all supply offers.
    pub fn total_supply(&self) -> f64 {
        self.supply.values().sum()
    }

    /// Sum of all demand bids.
    pub fn total_demand(&self) -> f64 {
        self.demand.values().sum()
    }

    /// Supply offered by one agent.
    pub fn supply_of(&self, agent_id: &AgentId) -> Option<f64> {
        self.supply.get(agent_id).copied()
    }

    /// Demand bid by one agent.
    pub fn demand_of(&self, agent_id: &AgentId) -> Option<f64> {
        self.demand.get(agent_id).copied()
    }

    /// Whether the book holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.supply.is_empty() && self.demand.is_empty()
    }
}

/// Price rule applied to one market at clearing time.
///
/// Implementations propose a new price; the [`MarketModel`] applies the
/// floor and rounding afterwards.
pub trait ClearingStrategy: fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Propose the new price for `market` given its current price and book.
    fn clear(&self, market: &MarketKey, current_price: f64, book: &OrderBook) -> f64;
}

/// Moves the price in proportion to the relative supply/demand imbalance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplePriceAdjustment {
    /// Maximum relative move per tick.
    pub price_adjustment_factor: f64,
}

impl SimplePriceAdjustment {
    /// Create the strategy with the given adjustment factor.
    pub const fn new(price_adjustment_factor: f64) -> Self {
        Self {
            price_adjustment_factor,
        }
    }

    /// Relative price change for the given totals.
    ///
    /// With supply present this is `(D - S) / max(S, D)` scaled by the
    /// factor, so it always lies within `[-factor, factor]`. Demand without
    /// supply moves the price up by the full factor. No activity yields 0.
    pub fn price_change_factor(&self, total_supply: f64, total_demand: f64) -> f64 {
        if total_supply > 0.0 {
            let imbalance = (total_demand - total_supply) / total_supply.max(total_demand);
            imbalance * self.price_adjustment_factor
        } else if total_demand > 0.0 {
            self.price_adjustment_factor
        } else {
            0.0
        }
    }
}

impl ClearingStrategy for SimplePriceAdjustment {
    fn name(&self) -> &'static str {
        "SIMPLE_PRICE_ADJUSTMENT"
    }

    fn clear(&self, market: &MarketKey, current_price: f64, book: &OrderBook) -> f64 {
        let factor = self.price_change_factor(book.total_supply(), book.total_demand());
        debug!(%market, current_price, factor, "Price adjustment");
        current_price * (1.0 + factor)
    }
}

/// Placeholder for a matching auction. Holds the price unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuctionBased;

impl ClearingStrategy for AuctionBased {
    fn name(&self) -> &'static str {
        "AUCTION_BASED"
    }

    fn clear(&self, market: &MarketKey, current_price: f64, _book: &OrderBook) -> f64 {
        warn!(%market, "Auction clearing is not implemented, holding price");
        current_price
    }
}

/// Build the strategy for a configured mechanism.
pub fn strategy_for(mechanism: ClearingMechanism, config: &MarketConfig) -> Box<dyn ClearingStrategy> {
    match mechanism {
        ClearingMechanism::SimplePriceAdjustment => {
            Box::new(SimplePriceAdjustment::new(config.price_adjustment_factor))
        }
        ClearingMechanism::AuctionBased => Box::new(AuctionBased),
    }
}

/// Result of one [`MarketModel::clear_market`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClearingReport {
    /// Every known market after clearing, in key order.
    pub quotes: Vec<MarketQuote>,
    /// How many markets had pending activity.
    pub cleared: usize,
    /// Markets whose proposed price was unusable.
    pub failures: Vec<StepFailure>,
}

impl ClearingReport {
    /// Full price table after clearing.
    pub fn prices(&self) -> BTreeMap<MarketKey, f64> {
        self.quotes
            .iter()
            .map(|quote| (quote.market.clone(), quote.price))
            .collect()
    }
}

/// Price table plus the current tick's order books.
#[derive(Debug)]
pub struct MarketModel {
    /// Price floor.
    min_price: f64,

    /// Starting price for a market first seen at clearing.
    default_price: f64,

    /// Decimal places committed prices are rounded to.
    price_decimals: Option<u32>,

    /// Price rule.
    strategy: Box<dyn ClearingStrategy>,

    /// Last committed price per market.
    prices: BTreeMap<MarketKey, f64>,

    /// Offers and bids since the last clearing.
    books: BTreeMap<MarketKey, OrderBook>,
}

impl MarketModel {
    /// Create a market from configuration, using its clearing mechanism.
    ///
    /// Initial prices listed in the config are not applied here; see
    /// [`initialize_prices`](Self::initialize_prices).
    pub fn new(config: &MarketConfig) -> Self {
        Self::with_strategy(config, strategy_for(config.clearing_mechanism, config))
    }

    /// Create a market with an explicit clearing strategy.
    pub fn with_strategy(config: &MarketConfig, strategy: Box<dyn ClearingStrategy>) -> Self {
        info!(
            strategy = strategy.name(),
            min_price = config.min_price,
            default_price = config.default_price,
            "Market model initialized"
        );
        Self {
            min_price: config.min_price,
            default_price: config.default_price,
            price_decimals: config.price_decimals,
            strategy,
            prices: BTreeMap::new(),
            books: BTreeMap::new(),
        }
    }

    /// Seed the price table. Prices below the floor are raised to it.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidPrice`] on the first non-finite price;
    /// entries before it are applied.
    pub fn initialize_prices(&mut self, prices: &[InitialPrice]) -> Result<(), MarketError> {
        for initial in prices {
            self.set_price(initial.key(), initial.price)?;
        }
        info!(markets = self.prices.len(), "Initial prices set");
        Ok(())
    }

    /// Set one market's price directly, subject to the floor.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidPrice`] if `price` is not finite.
    pub fn set_price(&mut self, market: MarketKey, price: f64) -> Result<(), MarketError> {
        if !price.is_finite() {
            return Err(MarketError::InvalidPrice { market, price });
        }
        let floored = if price < self.min_price {
            warn!(%market, price, min_price = self.min_price, "Price below floor, clamping");
            self.min_price
        } else {
            price
        };
        self.prices.insert(market, floored);
        Ok(())
    }

    /// Record `agent_id`'s supply offer for `item` in `region`.
    ///
    /// Replaces any earlier offer by the same agent on the same market this
    /// tick.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidQuantity`] if `quantity` is negative
    /// or not finite.
    pub fn submit_supply_offer(
        &mut self,
        agent_id: &AgentId,
        item: &CommodityId,
        quantity: f64,
        region: Option<&str>,
    ) -> Result<(), MarketError> {
        let market = MarketKey::new(item.clone(), region);
        Self::check_quantity(agent_id, &market, quantity)?;
        debug!(agent_id = %agent_id, %market, quantity, "Supply offer");
        self.books
            .entry(market)
            .or_default()
            .supply
            .insert(agent_id.clone(), quantity);
        Ok(())
    }

    /// Record `agent_id`'s demand bid for `item` in `region`.
    ///
    /// Replaces any earlier bid by the same agent on the same market this
    /// tick.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidQuantity`] if `quantity` is negative
    /// or not finite.
    pub fn submit_demand_bid(
        &mut self,
        agent_id: &AgentId,
        item: &CommodityId,
        quantity: f64,
        region: Option<&str>,
    ) -> Result<(), MarketError> {
        let market = MarketKey::new(item.clone(), region);
        Self::check_quantity(agent_id, &market, quantity)?;
        debug!(agent_id = %agent_id, %market, quantity, "Demand bid");
        self.books
            .entry(market)
            .or_default()
            .demand
            .insert(agent_id.clone(), quantity);
        Ok(())
    }

    fn check_quantity(agent_id: &AgentId, market: &MarketKey, quantity: f64) -> Result<(), MarketError> {
        if quantity.is_finite() && quantity >= 0.0 {
            Ok(())
        } else {
            Err(MarketError::InvalidQuantity {
                agent_id: agent_id.clone(),
                market: market.clone(),
                quantity,
            })
        }
    }

    /// Last committed price for `item` in `region`.
    ///
    /// Absent until the market has been seeded or cleared once.
    pub fn get_market_price(&self, item: &CommodityId, region: Option<&str>) -> Option<f64> {
        let market = MarketKey::new(item.clone(), region);
        let price = self.prices.get(&market).copied();
        if price.is_none() {
            debug!(%market, "No price available yet");
        }
        price
    }

    /// Last committed price for a market key.
    pub fn price(&self, market: &MarketKey) -> Option<f64> {
        self.prices.get(market).copied()
    }

    /// Full committed price table.
    pub const fn prices(&self) -> &BTreeMap<MarketKey, f64> {
        &self.prices
    }

    /// Pending book for a market, if anyone posted to it this tick.
    pub fn book(&self, market: &MarketKey) -> Option<&OrderBook> {
        self.books.get(market)
    }

    /// Price floor.
    pub const fn min_price(&self) -> f64 {
        self.min_price
    }

    /// Starting price for markets without history.
    pub const fn default_price(&self) -> f64 {
        self.default_price
    }

    /// Name of the active clearing strategy.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Clear every market with pending activity and empty the books.
    ///
    /// Markets without activity keep their price. A strategy result that
    /// is not finite leaves the old price in place and is reported as a
    /// failure.
    pub fn clear_market(&mut self) -> ClearingReport {
        let books = std::mem::take(&mut self.books);
        let mut report = ClearingReport {
            cleared: books.len(),
            ..ClearingReport::default()
        };
        let mut quotes: BTreeMap<MarketKey, MarketQuote> = BTreeMap::new();

        for (market, book) in books {
            let previous_price = self.prices.get(&market).copied();
            let current = previous_price.unwrap_or(self.default_price);
            let proposed = self.strategy.clear(&market, current, &book);

            let price = if proposed.is_finite() {
                self.finalize_price(proposed)
            } else {
                warn!(%market, proposed, "Clearing produced an invalid price, keeping previous");
                report.failures.push(StepFailure {
                    phase: FailurePhase::MarketClearing,
                    agent_id: None,
                    market: Some(market.clone()),
                    message: format!("{} produced non-finite price {proposed}", self.strategy.name()),
                });
                current.max(self.min_price)
            };

            debug!(
                %market,
                previous = ?previous_price,
                price,
                supply = book.total_supply(),
                demand = book.total_demand(),
                "Market cleared"
            );
            self.prices.insert(market.clone(), price);
            quotes.insert(
                market.clone(),
                MarketQuote {
                    market,
                    price,
                    previous_price,
                    total_supply: book.total_supply(),
                    total_demand: book.total_demand(),
                },
            );
        }

        for (market, price) in &self.prices {
            quotes.entry(market.clone()).or_insert_with(|| MarketQuote {
                market: market.clone(),
                price: *price,
                previous_price: Some(*price),
                total_supply: 0.0,
                total_demand: 0.0,
            });
        }

        report.quotes = quotes.into_values().collect();
        report
    }

    /// Apply the floor, then rounding, then the floor again.
    fn finalize_price(&self, proposed: f64) -> f64 {
        let floored = proposed.max(self.min_price);
        let rounded = self
            .price_decimals
            .and_then(|decimals| i32::try_from(decimals).ok())
            .map_or(floored, |decimals| round_to(floored, decimals));
        rounded.max(self.min_price)
    }
}

/// Round half away from zero to `decimals` places.
fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    (value * scale).round() / scale
}
