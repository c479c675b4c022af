//! Optional durations ("after 15s" or "never") and their elapsed checks.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A configured delay that may be disabled.
///
/// Used for `stale_after`, `retry_after` and `expire_after`. `Never` is the
/// default for all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    /// The delay never elapses
    #[default]
    Never,
    /// The delay elapses once this much time has passed
    After(#[serde(with = "duration_millis")] Duration),
}

impl Interval {
    pub fn after(duration: Duration) -> Self {
        Self::After(duration)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::After(Duration::from_secs(secs))
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::After(Duration::from_millis(millis))
    }

    /// `None` maps to `Never`, as in settings files.
    pub fn from_millis_opt(millis: Option<u64>) -> Self {
        millis.map_or(Self::Never, Self::from_millis)
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Self::Never)
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Never => None,
            Self::After(duration) => Some(*duration),
        }
    }

    /// The instant at which the interval started at `since` elapses.
    ///
    /// `None` for `Never`, or when the sum does not fit a timestamp.
    pub fn deadline(&self, since: Timestamp) -> Option<Timestamp> {
        let delta = chrono::Duration::from_std(self.duration()?).ok()?;
        since.checked_add_signed(delta)
    }

    /// True iff the interval started at `since` has fully elapsed at `now`.
    ///
    /// A `now` earlier than `since` never counts as elapsed.
    pub fn has_elapsed(&self, since: Timestamp, now: Timestamp) -> bool {
        match self.deadline(since) {
            Some(deadline) => now >= deadline && now >= since,
            None => false,
        }
    }
}

impl From<Duration> for Interval {
    fn from(duration: Duration) -> Self {
        Self::After(duration)
    }
}

impl From<Option<Duration>> for Interval {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Self::Never, Self::After)
    }
}

/// Durations on the wire are whole milliseconds, like the settings file.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
