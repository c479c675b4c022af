//! Typed commands accepted by the transition function.

use crate::error::FetchError;
use crate::record::DependencyValues;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a dependency change invalidates the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationMode {
    /// Reset the record to empty
    Clear,
    /// Keep the data but mark it stale
    Stale,
}

impl InvalidationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidationMode::Clear => "clear",
            InvalidationMode::Stale => "stale",
        }
    }
}

impl fmt::Display for InvalidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change applied to present data by [`Command::Adjust`].
pub enum Adjustment<T> {
    /// Replace the data outright
    Replace(T),
    /// Compute new data from the current data
    Transform(Box<dyn FnOnce(T) -> T + Send>),
}

impl<T> Adjustment<T> {
    pub fn replace(value: T) -> Self {
        Adjustment::Replace(value)
    }

    pub fn transform(f: impl FnOnce(T) -> T + Send + 'static) -> Self {
        Adjustment::Transform(Box::new(f))
    }

    /// Produce the adjusted value. Only called when data is present.
    pub(crate) fn apply(self, current: T) -> T {
        match self {
            Adjustment::Replace(value) => value,
            Adjustment::Transform(f) => f(current),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Adjustment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Adjustment::Replace(value) => f.debug_tuple("Replace").field(value).finish(),
            Adjustment::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

/// A command for [`crate::transition::apply`].
///
/// Commands carry their own timestamps; the transition function never reads
/// a clock.
#[derive(Debug)]
pub enum Command<T> {
    /// A fetch was issued
    FetchStarted,
    /// The current fetch resolved
    FetchSucceeded { value: T, at: Timestamp },
    /// The current fetch failed
    FetchFailed { error: FetchError, at: Timestamp },
    /// The in-flight fetch was superseded and its response discarded
    FetchAbandoned,
    /// Reset to the empty record
    Clear,
    /// Mark the data stale regardless of its age
    MarkStale,
    /// Change the data if (and only if) it is present
    Adjust(Adjustment<T>),
    /// A dependency changed in a way that invalidates the record
    DependencyInvalidate {
        snapshot: DependencyValues,
        mode: InvalidationMode,
    },
    /// Dependency values changed without invalidating anything
    SyncDependencies(DependencyValues),
}

impl<T> Command<T> {
    /// Static label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::FetchStarted => "fetch_started",
            Command::FetchSucceeded { .. } => "fetch_succeeded",
            Command::FetchFailed { .. } => "fetch_failed",
            Command::FetchAbandoned => "fetch_abandoned",
            Command::Clear => "clear",
            Command::MarkStale => "mark_stale",
            Command::Adjust(_) => "adjust",
            Command::DependencyInvalidate { .. } => "dependency_invalidate",
            Command::SyncDependencies(_) => "sync_dependencies",
        }
    }

    /// Whether applying this command makes any in-flight fetch obsolete.
    pub fn supersedes_fetch(&self) -> bool {
        matches!(
            self,
            Command::Clear | Command::DependencyInvalidate { .. }
        )
    }
}
