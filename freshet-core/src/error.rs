//! Error types for Freshet operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
///
/// These are the only errors surfaced as hard failures: they are raised when
/// a resource is constructed, never while it is running.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Dependency key declared more than once: {key}")]
    DuplicateDependency { key: String },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

impl ConfigError {
    pub(crate) fn missing(field: &str) -> Self {
        Self::MissingRequired {
            field: field.to_string(),
        }
    }

    /// Name of the offending field, when the error is tied to one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingRequired { field } | Self::InvalidValue { field, .. } => Some(field),
            Self::DuplicateDependency { .. } => Some("dependencies"),
            Self::Io { .. } | Self::Parse { .. } => None,
        }
    }
}

/// A failed fetch, recorded as state rather than raised.
///
/// The message is opaque to the engine. Only `permanent` is interpreted:
/// permanent failures are never retried automatically.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct FetchError {
    pub message: String,
    #[serde(default)]
    pub permanent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl FetchError {
    /// A failure that may be retried once the retry interval elapses.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            permanent: false,
            detail: None,
        }
    }

    /// A failure that is not worth retrying automatically.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            permanent: true,
            detail: None,
        }
    }

    /// Attach a structured payload (status codes, upstream bodies, ...).
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }
}

impl From<String> for FetchError {
    fn from(message: String) -> Self {
        Self::transient(message)
    }
}

impl From<&str> for FetchError {
    fn from(message: &str) -> Self {
        Self::transient(message)
    }
}

// =============================================================================
// TESTS
// =============================================================================
