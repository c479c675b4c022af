//! The raw resource record: the only persisted state of a resource.
//!
//! The record holds facts (values, flags, timestamps) and nothing derived.
//! Staleness, expiry and retry readiness are computed from it by
//! [`crate::view`], so none of those concepts ever appear as fields here.
//!
//! # Invariants
//!
//! - `data` is present iff `last_success_at` is present
//! - `error_is_permanent` is false whenever `error` is absent
//!
//! Fields are only written by [`crate::transition::apply`].

use crate::error::FetchError;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dependency key to the value last resolved for it.
///
/// Blank values are stored as JSON `null`.
pub type DependencyValues = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct ResourceRecord<T> {
    // Presence is the `Option`, never the value: `Some(null)` is present.
    #[serde(with = "presence")]
    pub(crate) data: Option<T>,
    pub(crate) is_loading: bool,
    pub(crate) error: Option<FetchError>,
    pub(crate) error_is_permanent: bool,
    pub(crate) last_success_at: Option<Timestamp>,
    pub(crate) last_failure_at: Option<Timestamp>,
    pub(crate) is_manually_stale: bool,
    pub(crate) dependency_snapshot: DependencyValues,
}

impl<T> ResourceRecord<T> {
    /// The fully empty record a resource starts with (and returns to on clear).
    pub fn empty() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
            error_is_permanent: false,
            last_success_at: None,
            last_failure_at: None,
            is_manually_stale: false,
            dependency_snapshot: DependencyValues::new(),
        }
    }

    /// A record seeded with initial data, treated as a success at `at`.
    pub fn seeded(value: T, at: Timestamp) -> Self {
        Self {
            data: Some(value),
            last_success_at: Some(at),
            ..Self::empty()
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn is_present(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_is_permanent(&self) -> bool {
        self.error_is_permanent
    }

    pub fn last_success_at(&self) -> Option<Timestamp> {
        self.last_success_at
    }

    pub fn last_failure_at(&self) -> Option<Timestamp> {
        self.last_failure_at
    }

    pub fn is_manually_stale(&self) -> bool {
        self.is_manually_stale
    }

    pub fn dependency_snapshot(&self) -> &DependencyValues {
        &self.dependency_snapshot
    }

    /// True when there is nothing a dependency change could invalidate: no
    /// data, no error, and no fetch in flight.
    pub fn is_blank_slate(&self) -> bool {
        self.data.is_none() && self.error.is_none() && !self.is_loading
    }

    /// Check the record invariants.
    pub fn is_consistent(&self) -> bool {
        self.data.is_some() == self.last_success_at.is_some()
            && (self.error.is_some() || !self.error_is_permanent)
    }
}

impl<T> Default for ResourceRecord<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Serde for the data slot that keeps a present `null` distinct from absent.
///
/// A plain `Option<T>` would decode `null` back to `None`; wrapping the
/// present value in a `{ "value": ... }` envelope avoids that.
mod presence {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    struct PresentRef<'a, T> {
        value: &'a T,
    }

    #[derive(Deserialize)]
    struct Present<T> {
        value: T,
    }

    pub fn serialize<T, S>(data: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match data {
            Some(value) => serializer.serialize_some(&PresentRef { value }),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Ok(Option::<Present<T>>::deserialize(deserializer)?.map(|present| present.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::{json, Value};

    #[test]
    fn test_empty_record() {
        let record: ResourceRecord<Value> = ResourceRecord::empty();
        assert!(!record.is_present());
        assert!(!record.is_loading());
        assert!(!record.has_error());
        assert!(!record.error_is_permanent());
        assert!(!record.is_manually_stale());
        assert!(record.dependency_snapshot().is_empty());
        assert!(record.is_consistent());
        assert_eq!(record, ResourceRecord::default());
    }

    #[test]
    fn test_seeded_record_sets_success_time() {
        let now = Utc::now();
        let record = ResourceRecord::seeded(json!("seed"), now);
        assert_eq!(record.data(), Some(&json!("seed")));
        assert_eq!(record.last_success_at(), Some(now));
        assert!(record.is_consistent());
    }

    #[test]
    fn test_null_is_present() {
        let record = ResourceRecord::seeded(Value::Null, Utc::now());
        assert!(record.is_present());
        assert_eq!(record.data(), Some(&Value::Null));
    }

    #[test]
    fn test_record_serde_keeps_presence_of_null() {
        let record = ResourceRecord::seeded(Value::Null, Utc::now());
        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(encoded["data"], json!({ "value": null }));

        let decoded: ResourceRecord<Value> = serde_json::from_value(encoded).unwrap();
        assert!(decoded.is_present());
        assert_eq!(decoded, record);

        let empty: ResourceRecord<Value> = ResourceRecord::empty();
        let decoded: ResourceRecord<Value> =
            serde_json::from_value(serde_json::to_value(&empty).unwrap()).unwrap();
        assert!(!decoded.is_present());
    }
}
