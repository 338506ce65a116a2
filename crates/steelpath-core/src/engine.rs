//! The simulation engine: owns every component and runs the tick cycle.
//!
//! Each call to [`SimulationEngine::run_step`] executes one tick:
//!
//! 1. **Clock**: advance by one step.
//! 2. **Events**: deliver every event due at or before the new time.
//! 3. **Agents**: step every agent once, in registration order.
//! 4. **Schedule**: commit the events agents requested while stepping.
//! 5. **Market**: clear every market with pending offers or bids.
//! 6. **Record**: append a [`StepRecord`] to the results.
//!
//! Failures inside an agent or a single market are recorded in the step
//! record and the tick carries on. Only clock and queue invariant
//! violations abort a run.
//!
//! # Lifecycle
//!
//! `Created -> Configured -> Running -> Finished`. Agents can only be
//! added while `Created`; [`setup`](SimulationEngine::setup) moves to
//! `Configured`; the first step moves to `Running`; the clock reaching a
//! bound moves to `Finished`.

use std::collections::BTreeMap;
use std::fmt;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use steelpath_types::{AgentId, FailurePhase, MarketKey, StepFailure, StepRecord, Timestamp};
use tracing::{info, warn};

use crate::agent::{Agent, AgentError, AgentRegistry, StepContext};
use crate::clock::{ClockError, SimulationClock};
use crate::config::{ConfigError, InitialPrice, SimulationConfig};
use crate::events::{EventQueue, EventQueueError, Outbox};
use crate::market::{MarketError, MarketModel};
use crate::runner::{self, NoOpObserver, SimulationEndReason, SimulationResult, StepObserver};

/// Errors that abort engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration was rejected.
    #[error("configuration error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The clock could not be built or advanced.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The event queue violated its ordering invariant.
    #[error("event queue error: {source}")]
    Events {
        /// The underlying queue error.
        #[from]
        source: EventQueueError,
    },

    /// An agent could not be registered or failed to initialize.
    #[error("agent error: {source}")]
    Agent {
        /// The underlying agent error.
        #[from]
        source: AgentError,
    },

    /// Initial prices could not be applied.
    #[error("market error: {source}")]
    Market {
        /// The underlying market error.
        #[from]
        source: MarketError,
    },

    /// The operation is not allowed in the current lifecycle state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// What was attempted.
        operation: &'static str,
        /// State the engine was in.
        state: EngineState,
    },
}

/// Lifecycle state of a [`SimulationEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Components built; agents may be added.
    Created,
    /// Agents initialized and prices seeded; no step taken yet.
    Configured,
    /// At least one step taken and the clock has not finished.
    Running,
    /// The clock reached a termination bound.
    Finished,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Owns the clock, event queue, market, agents and results of one run.
#[derive(Debug)]
pub struct SimulationEngine {
    config: SimulationConfig,
    state: EngineState,
    clock: SimulationClock,
    events: EventQueue,
    market: MarketModel,
    agents: AgentRegistry,
    extra_prices: Vec<InitialPrice>,
    rng: StdRng,
    results: Vec<StepRecord>,
}

impl SimulationEngine {
    /// Build an engine from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the configuration is invalid, or
    /// [`EngineError::Clock`] if the time section cannot produce a clock.
    pub fn new(config: SimulationConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let clock = SimulationClock::from_config(&config.time)?;
        let market = MarketModel::new(&config.market);
        let rng = StdRng::seed_from_u64(config.simulation.seed);

        info!(
            name = %config.simulation.name,
            seed = config.simulation.seed,
            max_steps = ?config.time.max_steps,
            "Simulation engine created"
        );

        Ok(Self {
            config,
            state: EngineState::Created,
            clock,
            events: EventQueue::new(),
            market,
            agents: AgentRegistry::new(),
            extra_prices: Vec::new(),
            rng,
            results: Vec::new(),
        })
    }

    /// Register an agent. Agents step in the order they were added.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] after [`setup`](Self::setup),
    /// or [`EngineError::Agent`] if the id is already taken.
    pub fn add_agent(&mut self, agent: Box<dyn Agent>) -> Result<(), EngineError> {
        self.require_created("add agents")?;
        self.agents.register(agent)?;
        Ok(())
    }

    /// Add an initial price applied at [`setup`](Self::setup), after the
    /// configured ones.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] after setup, or
    /// [`EngineError::Market`] if the price is not finite.
    pub fn add_initial_price(&mut self, price: InitialPrice) -> Result<(), EngineError> {
        self.require_created("add initial prices")?;
        if !price.price.is_finite() {
            return Err(MarketError::InvalidPrice {
                market: price.key(),
                price: price.price,
            }
            .into());
        }
        self.extra_prices.push(price);
        Ok(())
    }

    /// Schedule an event for `target` at `time`. Allowed in any state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Events`] if the queue has run out of
    /// sequence numbers.
    pub fn schedule_event(
        &mut self,
        time: Timestamp,
        target: impl Into<AgentId>,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<u64, EngineError> {
        let sequence = self.events.schedule(time, target, event_type, payload)?;
        Ok(sequence)
    }

    /// Initialize every agent and seed the market.
    ///
    /// Prices are seeded first. Events agents schedule from
    /// [`Agent::initialize`] are queued in registration order, and only
    /// once every agent has initialized, so a failed setup queues nothing.
    /// Calling this again while `Configured` does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] once a step has been taken,
    /// [`EngineError::Agent`] if an agent fails to initialize, or
    /// [`EngineError::Market`] if an initial price is not finite.
    pub fn setup(&mut self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Created => {}
            EngineState::Configured => return Ok(()),
            state @ (EngineState::Running | EngineState::Finished) => {
                return Err(EngineError::InvalidState {
                    operation: "set up",
                    state,
                });
            }
        }

        self.market.initialize_prices(&self.config.market.initial_prices)?;
        self.market.initialize_prices(&self.extra_prices)?;

        let start = self.clock.now();
        let mut outbox = Outbox::new();
        for agent in self.agents.iter_mut() {
            agent.initialize(start, &mut outbox)?;
        }
        let initial_events = outbox.len();
        self.events.commit(outbox)?;

        self.state = EngineState::Configured;
        info!(
            agents = self.agents.len(),
            initial_events,
            pending_events = self.events.len(),
            markets = self.market.prices().len(),
            "Simulation setup complete"
        );
        Ok(())
    }

    /// Execute one tick and return its record.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] before setup or after the run
    /// finished, or a clock/queue error that aborts the run.
    pub fn run_step(&mut self) -> Result<StepRecord, EngineError> {
        match self.state {
            EngineState::Configured | EngineState::Running => {}
            state @ (EngineState::Created | EngineState::Finished) => {
                return Err(EngineError::InvalidState {
                    operation: "run a step",
                    state,
                });
            }
        }
        self.state = EngineState::Running;

        // --- Phase 1: advance time ---
        let now = self.clock.tick()?;

        // --- Phase 2: deliver due events ---
        let drained = self.events.drain(now, &mut self.agents)?;
        let mut failures = drained.failures;

        // --- Phase 3: step agents ---
        let mut outbox = Outbox::new();
        for agent in self.agents.iter_mut() {
            let mut ctx = StepContext {
                now,
                market: &mut self.market,
                rng: &mut self.rng,
                outbox: &mut outbox,
            };
            if let Err(err) = agent.step(&mut ctx) {
                warn!(agent_id = %agent.id(), error = %err, "Agent step failed");
                failures.push(StepFailure {
                    phase: FailurePhase::AgentStep,
                    agent_id: Some(agent.id().clone()),
                    market: None,
                    message: err.to_string(),
                });
            }
        }

        // --- Phase 4: schedule follow-ups ---
        self.events.commit(outbox)?;

        // --- Phase 5: clear markets ---
        let clearing = self.market.clear_market();
        failures.extend(clearing.failures);

        // --- Phase 6: record ---
        let record = StepRecord {
            step: now.step,
            time: now.time,
            processed_events: drained.processed,
            prices: clearing.quotes,
            agents: self.agents.statuses(),
            failures,
        };
        info!(
            step = record.step,
            time = %record.time,
            events = record.processed_events.len(),
            markets_cleared = clearing.cleared,
            failures = record.failures.len(),
            "Step completed"
        );
        self.results.push(record.clone());

        if self.clock.is_finished(self.max_steps()) {
            self.state = EngineState::Finished;
        }
        Ok(record)
    }

    /// Run until the clock finishes, with no observer.
    ///
    /// # Errors
    ///
    /// See [`run_simulation_with`](Self::run_simulation_with).
    pub fn run_simulation(&mut self) -> Result<&[StepRecord], EngineError> {
        self.run_simulation_with(&mut NoOpObserver)
    }

    /// Run until the clock finishes, calling `observer` after every step.
    ///
    /// Performs [`setup`](Self::setup) first if needed. A run that has
    /// already finished returns its results unchanged.
    ///
    /// # Errors
    ///
    /// Returns the first error that aborts a step. Results recorded up to
    /// that point stay available through [`results`](Self::results).
    pub fn run_simulation_with(
        &mut self,
        observer: &mut dyn StepObserver,
    ) -> Result<&[StepRecord], EngineError> {
        match self.state {
            EngineState::Created => self.setup()?,
            EngineState::Configured | EngineState::Running => {}
            EngineState::Finished => return Ok(&self.results),
        }

        info!(
            name = %self.config.simulation.name,
            start = %self.clock.current_time(),
            end = ?self.clock.end_time(),
            max_steps = ?self.max_steps(),
            "Simulation starting"
        );

        while !self.clock.is_finished(self.max_steps()) {
            let record = self.run_step()?;
            observer.on_step(&record);
        }
        self.state = EngineState::Finished;

        if let Some(result) = self.result() {
            runner::log_simulation_end(&result);
        }
        Ok(&self.results)
    }

    /// Summary of a finished run, or `None` while it is still going.
    pub fn result(&self) -> Option<SimulationResult> {
        let end_reason = self.end_reason()?;
        Some(SimulationResult {
            end_reason,
            total_steps: self.clock.current_step(),
            final_time: self.clock.current_time(),
            final_prices: self.market.prices().clone(),
            total_failures: self.results.iter().map(|r| r.failures.len()).sum(),
        })
    }

    /// Which bound ended the run, if one has been reached.
    ///
    /// The end instant takes precedence when both are reached together.
    pub fn end_reason(&self) -> Option<SimulationEndReason> {
        if self
            .clock
            .end_time()
            .is_some_and(|end| self.clock.current_time() >= end)
        {
            return Some(SimulationEndReason::EndTimeReached);
        }
        if self
            .max_steps()
            .is_some_and(|max| self.clock.current_step() >= max)
        {
            return Some(SimulationEndReason::MaxStepsReached);
        }
        None
    }

    /// Records of every completed step, in order.
    pub fn results(&self) -> &[StepRecord] {
        &self.results
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// The simulation clock.
    pub const fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// The market model.
    pub const fn market(&self) -> &MarketModel {
        &self.market
    }

    /// Registered agents.
    pub const fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// Pending events.
    pub const fn events(&self) -> &EventQueue {
        &self.events
    }

    /// The configuration the engine was built from.
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Committed prices right now.
    pub fn prices(&self) -> &BTreeMap<MarketKey, f64> {
        self.market.prices()
    }

    const fn max_steps(&self) -> Option<u64> {
        self.config.time.max_steps
    }

    fn require_created(&self, operation: &'static str) -> Result<(), EngineError> {
        if self.state == EngineState::Created {
            Ok(())
        } else {
            Err(EngineError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}
