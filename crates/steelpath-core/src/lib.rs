//! Simulation kernel for SteelPath.
//!
//! This crate owns the loop that drives a run: the clock advances, due
//! events are delivered, every agent steps in registration order, the
//! commodity market clears, and a [`StepRecord`] is appended to the results.
//!
//! # Modules
//!
//! - [`clock`] -- [`SimulationClock`]: simulated time, step counter and
//!   termination bounds.
//! - [`config`] -- Configuration loading from `steelpath-config.yaml` into
//!   strongly-typed structs.
//! - [`events`] -- [`EventQueue`]: deterministic `(time, sequence)` delivery.
//! - [`agent`] -- The [`Agent`] capability trait and the ordered
//!   [`AgentRegistry`].
//! - [`market`] -- [`MarketModel`] and the pluggable [`ClearingStrategy`].
//! - [`engine`] -- [`SimulationEngine`]: the phased tick and the run loop.
//! - [`runner`] -- Step observers and end-of-run reporting.
//!
//! [`StepRecord`]: steelpath_types::StepRecord
//! [`SimulationClock`]: clock::SimulationClock
//! [`EventQueue`]: events::EventQueue
//! [`Agent`]: agent::Agent
//! [`AgentRegistry`]: agent::AgentRegistry
//! [`MarketModel`]: market::MarketModel
//! [`ClearingStrategy`]: market::ClearingStrategy
//! [`SimulationEngine`]: engine::SimulationEngine

pub mod agent;
pub mod clock;
pub mod config;
pub mod engine;
pub mod events;
pub mod market;
pub mod runner;
