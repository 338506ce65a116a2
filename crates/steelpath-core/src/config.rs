//! Configuration loading and typed config structures for a SteelPath run.
//!
//! The canonical configuration lives in `steelpath-config.yaml`. This module
//! defines strongly-typed structs mirroring the YAML structure and a loader
//! that reads and validates the file. Every section and field has a
//! default, so an empty document is a valid configuration.
//!
//! Component parameters are passed explicitly from here into the clock, the
//! market and the engine at construction time; nothing is read from global
//! state afterwards.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::Deserialize;
use steelpath_types::{CommodityId, MarketKey, Timestamp};

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but describes an impossible run.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Run identity and seeding.
    #[serde(default)]
    pub simulation: RunConfig,

    /// Calendar, step size and termination bounds.
    #[serde(default)]
    pub time: TimeConfig,

    /// Market clearing parameters and initial prices.
    #[serde(default)]
    pub market: MarketConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load and validate configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml rejects an empty document; treat it as "all defaults".
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Deserialize and validate configuration from an already-parsed YAML
    /// document. Keys outside the known sections are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if a section has the wrong shape, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_value(value: serde_yml::Value) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section for values that would make the run impossible.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.time.validate()?;
        self.market.validate()
    }
}

/// Run identity and seeding.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Human-readable run name.
    #[serde(default = "default_simulation_name")]
    pub name: String,

    /// Seed for the random source handed to agents.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: default_simulation_name(),
            seed: default_seed(),
        }
    }
}

/// Calendar and termination configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimeConfig {
    /// Start of the run, `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS`.
    #[serde(default = "default_start_datetime")]
    pub start_datetime: String,

    /// Optional end of the run, same formats as `start_datetime`.
    #[serde(default)]
    pub end_datetime: Option<String>,

    /// Whole days per step.
    #[serde(default = "default_time_step_days")]
    pub time_step_days: i64,

    /// Additional hours per step.
    #[serde(default)]
    pub time_step_hours: i64,

    /// Maximum number of steps to run.
    #[serde(default = "default_max_steps")]
    pub max_steps: Option<u64>,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            start_datetime: default_start_datetime(),
            end_datetime: None,
            time_step_days: default_time_step_days(),
            time_step_hours: 0,
            max_steps: default_max_steps(),
        }
    }
}

impl TimeConfig {
    /// Parse the configured start instant.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the string is not a recognized date.
    pub fn start(&self) -> Result<Timestamp, ConfigError> {
        parse_timestamp(&self.start_datetime)
    }

    /// Parse the configured end instant, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the string is not a recognized date.
    pub fn end(&self) -> Result<Option<Timestamp>, ConfigError> {
        self.end_datetime.as_deref().map(parse_timestamp).transpose()
    }

    /// Combine the day and hour components into one step duration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the components overflow a duration.
    pub fn step_size(&self) -> Result<TimeDelta, ConfigError> {
        let overflow = || ConfigError::Invalid {
            reason: format!(
                "time step of {} days and {} hours is out of range",
                self.time_step_days, self.time_step_hours
            ),
        };
        let days = TimeDelta::try_days(self.time_step_days).ok_or_else(overflow)?;
        let hours = TimeDelta::try_hours(self.time_step_hours).ok_or_else(overflow)?;
        days.checked_add(&hours).ok_or_else(overflow)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let start = self.start()?;
        let end = self.end()?;
        let step = self.step_size()?;
        if step <= TimeDelta::zero() {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "time step must be positive, got {} days and {} hours",
                    self.time_step_days, self.time_step_hours
                ),
            });
        }
        if let Some(end) = end.filter(|end| *end <= start) {
            return Err(ConfigError::Invalid {
                reason: format!("time.end_datetime {end} is not after start {start}"),
            });
        }
        if end.is_none() && self.max_steps.is_none() {
            return Err(ConfigError::Invalid {
                reason: "either time.end_datetime or time.max_steps must be set".to_owned(),
            });
        }
        Ok(())
    }
}

/// Price-formation rule used when clearing markets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClearingMechanism {
    /// Move price proportionally to the supply/demand imbalance.
    #[default]
    SimplePriceAdjustment,
    /// Auction-based clearing. Reserved; currently holds prices unchanged.
    AuctionBased,
}

/// Market clearing configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarketConfig {
    /// Sensitivity of price to the relative supply/demand imbalance.
    #[serde(default = "default_price_adjustment_factor")]
    pub price_adjustment_factor: f64,

    /// Hard price floor applied on every clearing.
    #[serde(default = "default_min_price")]
    pub min_price: f64,

    /// Starting price for a market first seen at clearing time.
    #[serde(default = "default_default_price")]
    pub default_price: f64,

    /// Price-formation rule.
    #[serde(default)]
    pub clearing_mechanism: ClearingMechanism,

    /// Round committed prices to this many decimal places (off when unset).
    #[serde(default)]
    pub price_decimals: Option<u32>,

    /// Prices known before the first step.
    #[serde(default)]
    pub initial_prices: Vec<InitialPrice>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            price_adjustment_factor: default_price_adjustment_factor(),
            min_price: default_min_price(),
            default_price: default_default_price(),
            clearing_mechanism: ClearingMechanism::default(),
            price_decimals: None,
            initial_prices: Vec::new(),
        }
    }
}

impl MarketConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| Err(ConfigError::Invalid { reason });

        if !self.price_adjustment_factor.is_finite() || self.price_adjustment_factor < 0.0 {
            return invalid(format!(
                "market.price_adjustment_factor must be a non-negative number, got {}",
                self.price_adjustment_factor
            ));
        }
        if !self.min_price.is_finite() || self.min_price < 0.0 {
            return invalid(format!(
                "market.min_price must be a non-negative number, got {}",
                self.min_price
            ));
        }
        if !self.default_price.is_finite() || self.default_price < self.min_price {
            return invalid(format!(
                "market.default_price ({}) must be at least market.min_price ({})",
                self.default_price, self.min_price
            ));
        }
        if self.price_decimals.is_some_and(|d| d > MAX_PRICE_DECIMALS) {
            return invalid(format!(
                "market.price_decimals must be at most {MAX_PRICE_DECIMALS}"
            ));
        }
        for initial in &self.initial_prices {
            if !initial.price.is_finite() || initial.price < 0.0 {
                return invalid(format!(
                    "initial price for {} must be a non-negative number, got {}",
                    initial.key(),
                    initial.price
                ));
            }
        }
        Ok(())
    }
}

/// Upper bound on `price_decimals`; beyond this rounding is meaningless for `f64`.
pub const MAX_PRICE_DECIMALS: u32 = 10;

/// A price known before the run starts, typically from historical market data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InitialPrice {
    /// Commodity the price applies to.
    pub commodity: CommodityId,
    /// Region, or none for the global market.
    #[serde(default)]
    pub region: Option<String>,
    /// Price per tonne.
    pub price: f64,
}

impl InitialPrice {
    /// The market this price seeds.
    pub fn key(&self) -> MarketKey {
        MarketKey {
            commodity: self.commodity.clone(),
            region: self.region.clone(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Parse an ISO-like date or date-time string.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS` and `YYYY-MM-DD HH:MM:SS`
/// (fractional seconds allowed). A bare date means midnight.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] for any other format.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, ConfigError> {
    let trimmed = raw.trim();
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ConfigError::Invalid {
            reason: format!(
                "invalid datetime `{raw}`: expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS"
            ),
        })
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_simulation_name() -> String {
    "SteelPath_Default_Sim".to_owned()
}

const fn default_seed() -> u64 {
    42
}

fn default_start_datetime() -> String {
    "2024-01-01T00:00:00".to_owned()
}

const fn default_time_step_days() -> i64 {
    1
}

#[allow(clippy::unnecessary_wraps)]
const fn default_max_steps() -> Option<u64> {
    Some(365)
}

const fn default_price_adjustment_factor() -> f64 {
    0.05
}

const fn default_min_price() -> f64 {
    10.0
}

const fn default_default_price() -> f64 {
    100.0
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.simulation.seed, 42);
        assert_eq!(config.time.max_steps, Some(365));
        assert_eq!(
            config.market.clearing_mechanism,
            ClearingMechanism::SimplePriceAdjustment
        );
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
simulation:
  name: "Rebar 2030"
  seed: 7

time:
  start_datetime: "2030-01-01"
  end_datetime: "2030-03-01T00:00:00"
  time_step_days: 7
  max_steps: null

market:
  price_adjustment_factor: 0.1
  min_price: 25.0
  default_price: 120.0
  clearing_mechanism: AUCTION_BASED
  price_decimals: 2
  initial_prices:
    - commodity: rebar
      region: North America
      price: 700.0
    - commodity: iron_ore
      price: 110.0

logging:
  level: debug
  json: true
"#;

        let config = SimulationConfig::parse(yaml).unwrap();
        assert_eq!(config.simulation.name, "Rebar 2030");
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(config.time.time_step_days, 7);
        assert_eq!(config.time.max_steps, None);
        assert_eq!(
            config.time.end().unwrap(),
            Some(parse_timestamp("2030-03-01").unwrap())
        );
        assert_eq!(config.market.clearing_mechanism, ClearingMechanism::AuctionBased);
        assert_eq!(config.market.price_decimals, Some(2));
        assert_eq!(config.market.initial_prices.len(), 2);
        assert_eq!(
            config.market.initial_prices[0].key(),
            MarketKey::regional("rebar", "North America")
        );
        assert_eq!(config.market.initial_prices[1].key(), MarketKey::global("iron_ore"));
        assert!(config.logging.json);
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = SimulationConfig::parse("simulation:\n  seed: 9\n").unwrap();
        assert_eq!(config.simulation.seed, 9);
        assert_eq!(config.time.time_step_days, 1);
        assert_eq!(config.market.initial_prices.len(), 0);
    }

    #[test]
    fn from_value_ignores_foreign_sections() {
        let yaml = "simulation:\n  seed: 5\nagents:\n  plants: []\noutput: {}\n";
        let value: serde_yml::Value = serde_yml::from_str(yaml).unwrap();
        let config = SimulationConfig::from_value(value).unwrap();
        assert_eq!(config.simulation.seed, 5);

        let bad: serde_yml::Value = serde_yml::from_str("time:\n  time_step_days: 0\n").unwrap();
        assert!(matches!(
            SimulationConfig::from_value(bad),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(SimulationConfig::parse("").is_ok());
    }

    #[test]
    fn unbounded_run_is_rejected() {
        let yaml = "time:\n  max_steps: null\n";
        let result = SimulationConfig::parse(yaml);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn non_positive_step_is_rejected() {
        for yaml in [
            "time:\n  time_step_days: 0\n",
            "time:\n  time_step_days: 1\n  time_step_hours: -24\n",
            "time:\n  time_step_days: -2\n",
        ] {
            assert!(
                matches!(SimulationConfig::parse(yaml), Err(ConfigError::Invalid { .. })),
                "accepted {yaml:?}"
            );
        }
        let half_day = "time:\n  time_step_days: 0\n  time_step_hours: 12\n";
        assert!(SimulationConfig::parse(half_day).is_ok());
    }

    #[test]
    fn end_not_after_start_is_rejected() {
        let before = "time:\n  start_datetime: \"2024-05-01\"\n  end_datetime: \"2024-01-01\"\n";
        let equal = "time:\n  start_datetime: \"2024-05-01\"\n  end_datetime: \"2024-05-01\"\n";
        for yaml in [before, equal] {
            let err = SimulationConfig::parse(yaml).unwrap_err();
            assert!(err.to_string().contains("not after start"), "{err}");
        }
    }

    #[test]
    fn default_price_below_floor_is_rejected() {
        let yaml = "market:\n  min_price: 50.0\n  default_price: 20.0\n";
        assert!(matches!(
            SimulationConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn negative_adjustment_factor_is_rejected() {
        let yaml = "market:\n  price_adjustment_factor: -0.5\n";
        assert!(SimulationConfig::parse(yaml).is_err());
    }

    #[test]
    fn bad_date_is_rejected() {
        let yaml = "time:\n  start_datetime: \"01/02/2024\"\n";
        assert!(matches!(
            SimulationConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn unknown_clearing_mechanism_is_a_yaml_error() {
        let yaml = "market:\n  clearing_mechanism: SEALED_BID\n";
        assert!(matches!(
            SimulationConfig::parse(yaml),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn timestamp_formats() {
        let midnight = parse_timestamp("2024-01-05").unwrap();
        assert_eq!(midnight, parse_timestamp("2024-01-05T00:00:00").unwrap());
        assert_eq!(midnight, parse_timestamp("2024-01-05 00:00:00").unwrap());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn step_size_combines_days_and_hours() {
        let time = TimeConfig {
            time_step_days: 1,
            time_step_hours: 12,
            ..TimeConfig::default()
        };
        assert_eq!(time.step_size().unwrap(), TimeDelta::hours(36));
    }
}
