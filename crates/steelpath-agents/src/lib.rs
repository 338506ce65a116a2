//! Steel-industry agents for the SteelPath simulation.
//!
//! Each agent implements [`steelpath_core::agent::Agent`] and talks to the
//! market only through the step context the engine hands it. Together they
//! close the feedback loop the kernel is built for: plants and suppliers
//! react to prices by changing output, buyers react by changing demand, and
//! the market moves prices in response.
//!
//! # Modules
//!
//! - [`plant`] -- [`SteelPlant`]: converts iron ore into a steel product,
//!   throttles utilization around its breakeven price, goes offline for
//!   maintenance.
//! - [`supplier`] -- [`RawMaterialSupplier`]: offers a raw material and
//!   expands capacity when prices are high.
//! - [`buyer`] -- [`SteelBuyer`]: growing, noisy, price-sensitive demand.
//! - [`error`] -- Configuration errors ([`AgentConfigError`]).
//! - [`event_types`] -- Event tags the agents understand.

pub mod buyer;
pub mod error;
pub mod plant;
pub mod supplier;

pub use buyer::{BuyerConfig, SteelBuyer};
pub use error::AgentConfigError;
pub use plant::{PlantConfig, SteelPlant};
pub use supplier::{RawMaterialSupplier, SupplierConfig};

/// Event tags understood by the agents in this crate.
pub mod event_types {
    /// Take a plant offline. Payload: `{"duration_steps": u64}` (optional).
    pub const MAINTENANCE_START: &str = "MAINTENANCE_START";
    /// Bring a plant back online.
    pub const MAINTENANCE_END: &str = "MAINTENANCE_END";
    /// Add ore to a plant's stock. Payload: `{"quantity": f64}`.
    pub const RAW_MATERIAL_DELIVERY: &str = "RAW_MATERIAL_DELIVERY";
    /// Reset a buyer's reference price. Payload: `{"price": f64}`.
    pub const PRICE_UPDATE: &str = "PRICE_UPDATE";
}

/// Status string for an agent taken offline.
pub const STATUS_MAINTENANCE: &str = "maintenance";

/// Read a required numeric payload field.
pub(crate) fn required_f64(
    event: &steelpath_types::Event,
    field: &str,
) -> Result<f64, steelpath_core::agent::AgentError> {
    event
        .payload_f64(field)
        .filter(|value| value.is_finite())
        .ok_or_else(|| steelpath_core::agent::AgentError::InvalidEvent {
            event_type: event.event_type.clone(),
            reason: format!("missing or non-numeric `{field}`"),
        })
}

/// Read an optional unsigned integer payload field. A missing or null field
/// is `None`; any other non-`u64` value is an error.
pub(crate) fn optional_u64(
    event: &steelpath_types::Event,
    field: &str,
) -> Result<Option<u64>, steelpath_core::agent::AgentError> {
    match event.payload.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            steelpath_core::agent::AgentError::InvalidEvent {
                event_type: event.event_type.clone(),
                reason: format!("`{field}` must be a non-negative integer, got {value}"),
            }
        }),
    }
}

/// Resolve a configured id, generating one when absent.
pub(crate) fn resolve_id(id: Option<&str>) -> steelpath_types::AgentId {
    id.map_or_else(steelpath_types::AgentId::generate, steelpath_types::AgentId::from)
}
