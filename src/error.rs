//! Typed errors for the cases callers branch on.

use rust_decimal::Decimal;
use thiserror::Error;

/// Configuration and lifecycle errors returned by engine construction and `start`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Mirror strategy has nobody to mirror
    #[error("No target trader configured")]
    MissingTarget,

    /// Entry band is empty or outside (0, 1)
    #[error("Invalid entry band [{min}, {max}]")]
    InvalidBand { min: Decimal, max: Decimal },

    /// Any other out-of-range setting
    #[error("Invalid config `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// `start` called on an engine that is already running
    #[error("Engine already running")]
    AlreadyRunning,
}

impl EngineError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
