//! Agent capability interface.
//!
//! Every participant in a run implements [`Agent`]. The engine drives agents
//! in a fixed order each tick:
//!
//! 1. [`Agent::handle_event`] for every due event addressed to the agent.
//! 2. [`Agent::step`] once, in registration order.
//! 3. [`Agent::status`] when the step record is assembled.
//!
//! Agents interact with the rest of the run only through the context they
//! are handed: the market for offers and bids, a seeded RNG, and an
//! [`Outbox`] for follow-up events. Nothing is shared behind their backs,
//! so a run with the same seed, agents and events is reproducible.

use std::collections::BTreeMap;
use std::fmt;

use rand::rngs::StdRng;
use steelpath_types::{AgentId, AgentStatus, Event, SimulationTime};
use tracing::{debug, info};

use crate::events::Outbox;
use crate::market::{MarketError, MarketModel};

/// Recoverable failures raised by an agent.
///
/// The engine records these in the step record and carries on with the
/// next agent or event.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// An event payload was missing a field or carried a bad value.
    #[error("invalid {event_type} event: {reason}")]
    InvalidEvent {
        /// Tag of the rejected event.
        event_type: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A market call was rejected.
    #[error("market error: {source}")]
    Market {
        /// The underlying market error.
        #[from]
        source: MarketError,
    },

    /// A collaborator produced an unusable value.
    #[error("calculation failed: {reason}")]
    Calculation {
        /// Explanation of the failure.
        reason: String,
    },

    /// Two agents were registered with the same id.
    #[error("duplicate agent id: {agent_id}")]
    DuplicateId {
        /// The id that was already taken.
        agent_id: AgentId,
    },
}

/// What an agent can reach during [`Agent::step`].
pub struct StepContext<'a> {
    /// Current simulation time.
    pub now: SimulationTime,
    /// The market, for prices, offers and bids.
    pub market: &'a mut MarketModel,
    /// The run's seeded random number generator.
    pub rng: &'a mut StdRng,
    /// Buffer for events to schedule once the step phase is over.
    pub outbox: &'a mut Outbox,
}

/// What an agent can reach during [`Agent::handle_event`].
pub struct EventContext<'a> {
    /// Current simulation time.
    pub now: SimulationTime,
    /// Buffer for follow-up events, committed after the drain.
    pub outbox: &'a mut Outbox,
}

/// A simulation participant.
///
/// Only [`id`](Self::id) and [`kind`](Self::kind) are required; every hook
/// defaults to doing nothing.
pub trait Agent {
    /// Unique id within the run.
    fn id(&self) -> &AgentId;

    /// Agent kind, e.g. `"SteelPlant"`.
    fn kind(&self) -> &str;

    /// One-time setup before the first tick.
    ///
    /// # Errors
    ///
    /// Returns an [`AgentError`] if the agent cannot start.
    fn initialize(
        &mut self,
        _start: SimulationTime,
        _outbox: &mut Outbox,
    ) -> Result<(), AgentError> {
        Ok(())
    }

    /// Per-tick behavior. Called once per tick after event delivery.
    ///
    /// # Errors
    ///
    /// Returns an [`AgentError`] on a recoverable failure.
    fn step(&mut self, _ctx: &mut StepContext<'_>) -> Result<(), AgentError> {
        Ok(())
    }

    /// React to one event addressed to this agent.
    ///
    /// # Errors
    ///
    /// Returns an [`AgentError`] if the event cannot be handled.
    fn handle_event(
        &mut self,
        _event: &Event,
        _ctx: &mut EventContext<'_>,
    ) -> Result<(), AgentError> {
        Ok(())
    }

    /// Status snapshot for the step record.
    fn status(&self) -> AgentStatus {
        AgentStatus::nominal(self.id().clone(), self.kind())
    }
}

/// Resolve an agent by id for event delivery.
pub trait AgentLookup {
    /// Mutable access to the agent with `id`, if registered.
    fn agent_mut(&mut self, id: &AgentId) -> Option<&mut dyn Agent>;
}

impl AgentLookup for BTreeMap<AgentId, Box<dyn Agent>> {
    fn agent_mut(&mut self, id: &AgentId) -> Option<&mut dyn Agent> {
        let agent: &mut dyn Agent = self.get_mut(id)?.as_mut();
        Some(agent)
    }
}

/// Agents of one run in registration order, indexed by id.
#[derive(Default)]
pub struct AgentRegistry {
    agents: Vec<Box<dyn Agent>>,
    index: BTreeMap<AgentId, usize>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            agents: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    /// Add an agent at the end of the step order.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::DuplicateId`] if the id is already taken.
    pub fn register(&mut self, agent: Box<dyn Agent>) -> Result<(), AgentError> {
        let agent_id = agent.id().clone();
        if self.index.contains_key(&agent_id) {
            return Err(AgentError::DuplicateId { agent_id });
        }
        info!(agent_id = %agent_id, kind = agent.kind(), "Agent registered");
        self.index.insert(agent_id, self.agents.len());
        self.agents.push(agent);
        Ok(())
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agents are registered.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Whether an agent with `id` is registered.
    pub fn contains(&self, id: &AgentId) -> bool {
        self.index.contains_key(id)
    }

    /// Shared access to the agent with `id`.
    pub fn get(&self, id: &AgentId) -> Option<&dyn Agent> {
        let position = *self.index.get(id)?;
        let agent: &dyn Agent = self.agents.get(position)?.as_ref();
        Some(agent)
    }

    /// Agents in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Agent> {
        self.agents.iter().map(|agent| {
            let agent: &dyn Agent = agent.as_ref();
            agent
        })
    }

    /// Mutable agents in registration order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Agent>> {
        self.agents.iter_mut()
    }

    /// Status of every agent in registration order.
    pub fn statuses(&self) -> Vec<AgentStatus> {
        self.agents.iter().map(|agent| agent.status()).collect()
    }
}

impl AgentLookup for AgentRegistry {
    fn agent_mut(&mut self, id: &AgentId) -> Option<&mut dyn Agent> {
        let position = *self.index.get(id)?;
        debug!(agent_id = %id, position, "Resolving event target");
        let agent: &mut dyn Agent = self.agents.get_mut(position)?.as_mut();
        Some(agent)
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.agents.iter().map(|agent| agent.id()))
            .finish()
    }
}
