//! Identifier newtypes.
//!
//! Agents and commodities are named by strings coming from configuration
//! (`"plant-north"`, `"iron_ore"`), so unlike database-backed ids these wrap
//! a [`String`]. The wrappers keep the two namespaces from being mixed up
//! and give both a total order, which the engine relies on for
//! deterministic iteration over `BTreeMap`s.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the inner [`String`].
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for an agent. Stable for the whole run.
    AgentId
}

define_id! {
    /// Identifier of a traded commodity (a steel product or a raw material).
    CommodityId
}

impl AgentId {
    /// Generate a fresh random identifier (UUID v4).
    ///
    /// Used when an agent is configured without an explicit id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}
