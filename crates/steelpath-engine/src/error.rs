//! Error types for the SteelPath binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup, the run, and writing results.

/// Top-level error for the SteelPath binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: steelpath_core::config::ConfigError,
    },

    /// The simulation engine rejected an operation or aborted the run.
    #[error("simulation error: {source}")]
    Simulation {
        /// The underlying engine error.
        #[from]
        source: steelpath_core::engine::EngineError,
    },

    /// An agent could not be built from its configuration.
    #[error("agent config error: {source}")]
    AgentConfig {
        /// The underlying agent configuration error.
        #[from]
        source: steelpath_agents::AgentConfigError,
    },

    /// A section of the config file could not be parsed.
    #[error("failed to parse `{section}` section: {message}")]
    Section {
        /// Top-level key of the section.
        section: &'static str,
        /// Description of the parse failure.
        message: String,
    },

    /// Writing results failed.
    #[error("output error: {message}")]
    Output {
        /// Description of the output failure.
        message: String,
    },
}
