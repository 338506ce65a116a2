//! Per-step output of the engine.
//!
//! One [`StepRecord`] is produced per tick and appended to the run's
//! results. Records are plain data: once built they are never mutated,
//! and serializing two records from identical runs yields identical bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::ids::{AgentId, CommodityId};
use crate::market::{MarketKey, MarketQuote};
use crate::time::Timestamp;

/// Status string reported by agents with nothing unusual to say.
pub const STATUS_NOMINAL: &str = "nominal";

/// Reporting snapshot of one agent. Never used to drive simulation logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    /// The agent's identifier.
    pub agent_id: AgentId,
    /// The agent's type tag.
    pub agent_type: String,
    /// Short free-form status, `"nominal"` by default.
    pub status: String,
    /// Named numeric metrics (output, stock, utilization, ...).
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl AgentStatus {
    /// A nominal status with no metrics.
    pub fn nominal(agent_id: AgentId, agent_type: &str) -> Self {
        Self {
            agent_id,
            agent_type: agent_type.to_owned(),
            status: STATUS_NOMINAL.to_owned(),
            metrics: BTreeMap::new(),
        }
    }

    /// Replace the status string.
    #[must_use]
    pub fn with_status(mut self, status: &str) -> Self {
        status.clone_into(&mut self.status);
        self
    }

    /// Add (or overwrite) a metric.
    #[must_use]
    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_owned(), value);
        self
    }
}

/// The tick phase in which a recoverable failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePhase {
    /// An agent failed while handling a delivered event.
    EventDelivery,
    /// An agent failed during its step.
    AgentStep,
    /// A market could not be cleared normally.
    MarketClearing,
}

/// A recoverable failure noted in a step record instead of aborting the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Phase that produced the failure.
    pub phase: FailurePhase,
    /// Agent involved, if any.
    pub agent_id: Option<AgentId>,
    /// Market involved, if any.
    pub market: Option<MarketKey>,
    /// Human-readable description.
    pub message: String,
}

/// Immutable snapshot of the simulation taken at the end of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step counter after the tick (1 for the first tick).
    pub step: u64,
    /// Simulated instant after the tick.
    pub time: Timestamp,
    /// Events drained and processed during this tick, in delivery order.
    pub processed_events: Vec<Event>,
    /// Every known market after clearing, in market key order.
    pub prices: Vec<MarketQuote>,
    /// Agent statuses in registration order.
    pub agents: Vec<AgentStatus>,
    /// Recoverable failures noted during this tick.
    pub failures: Vec<StepFailure>,
}

impl StepRecord {
    /// Look up the quote for a market in this record.
    pub fn quote(&self, commodity: &CommodityId, region: Option<&str>) -> Option<&MarketQuote> {
        self.prices
            .iter()
            .find(|q| q.market.commodity == *commodity && q.market.region.as_deref() == region)
    }

    /// Look up the committed price for a market in this record.
    pub fn price(&self, commodity: &CommodityId, region: Option<&str>) -> Option<f64> {
        self.quote(commodity, region).map(|q| q.price)
    }

    /// Look up an agent's status in this record.
    pub fn agent(&self, agent_id: &AgentId) -> Option<&AgentStatus> {
        self.agents.iter().find(|s| s.agent_id == *agent_id)
    }

    /// Whether any recoverable failure was noted during this tick.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
