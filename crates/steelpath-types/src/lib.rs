//! Shared type definitions for the SteelPath simulation kernel.
//!
//! Everything that crosses a crate boundary lives here: identifiers,
//! simulated time, scheduled events, market keys and the per-step records
//! produced by the engine.
//!
//! # Modules
//!
//! - [`ids`] -- String-backed identifier newtypes for agents and commodities
//! - [`time`] -- [`SimulationTime`], the (instant, step) pair the clock hands out
//! - [`event`] -- Scheduled [`Event`]s and their total ordering key
//! - [`market`] -- [`MarketKey`] and per-cycle [`MarketQuote`]s
//! - [`record`] -- [`StepRecord`], [`AgentStatus`] and [`StepFailure`]

pub mod event;
pub mod ids;
pub mod market;
pub mod record;
pub mod time;

pub use event::{Event, EventKey};
pub use ids::{AgentId, CommodityId};
pub use market::{MarketKey, MarketQuote};
pub use record::{AgentStatus, FailurePhase, StepFailure, StepRecord};
pub use time::{SimulationTime, Timestamp};
