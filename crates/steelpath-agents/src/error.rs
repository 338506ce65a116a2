//! Error types for the steelpath-agents crate.

/// Errors raised while building an agent from its configuration.
#[derive(Debug, thiserror::Error)]
pub enum AgentConfigError {
    /// A parameter is out of range.
    #[error("invalid {kind} configuration: {reason}")]
    Invalid {
        /// Agent kind being configured.
        kind: &'static str,
        /// Which parameter is wrong and why.
        reason: String,
    },
}

/// Fail with [`AgentConfigError::Invalid`] unless `value` is finite and `>= 0`.
pub(crate) fn non_negative(kind: &'static str, name: &str, value: f64) -> Result<(), AgentConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AgentConfigError::Invalid {
            kind,
            reason: format!("{name} must be a finite non-negative number, got {value}"),
        })
    }
}

/// Fail with [`AgentConfigError::Invalid`] unless `value` lies in `[0, 1]`.
pub(crate) fn fraction(kind: &'static str, name: &str, value: f64) -> Result<(), AgentConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AgentConfigError::Invalid {
            kind,
            reason: format!("{name} must lie in [0, 1], got {value}"),
        })
    }
}
