//! Error types for the resource host

use freshet_core::ConfigError;
use thiserror::Error;

/// Failures of the host itself, never of a fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("Resource host for {resource} is closed")]
    Closed { resource: String },
}

/// Master error type for all freshet operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FreshetError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),
}

/// Result type alias for freshet operations.
pub type FreshetResult<T> = Result<T, FreshetError>;

// =============================================================================
// TESTS
// =============================================================================
