//! The pure transition function `(record, command) -> record`.
//!
//! Total over every command: no precondition can fail. The function has no
//! notion of request identity; discarding responses of superseded fetches is
//! the orchestrator's job.

use crate::command::{Command, InvalidationMode};
use crate::record::ResourceRecord;

/// Apply one command to a record.
pub fn apply<T>(record: ResourceRecord<T>, command: Command<T>) -> ResourceRecord<T> {
    match command {
        Command::FetchStarted => ResourceRecord {
            is_loading: true,
            ..record
        },

        Command::FetchSucceeded { value, at } => ResourceRecord {
            data: Some(value),
            is_loading: false,
            error: None,
            error_is_permanent: false,
            last_success_at: Some(at),
            is_manually_stale: false,
            ..record
        },

        // Existing data and its success time survive a failed refetch.
        Command::FetchFailed { error, at } => ResourceRecord {
            is_loading: false,
            error_is_permanent: error.is_permanent(),
            error: Some(error),
            last_failure_at: Some(at),
            ..record
        },

        Command::FetchAbandoned => ResourceRecord {
            is_loading: false,
            ..record
        },

        Command::Clear => ResourceRecord::empty(),

        Command::MarkStale => ResourceRecord {
            is_manually_stale: true,
            ..record
        },

        Command::Adjust(adjustment) => {
            let mut record = record;
            // The adjustment is dropped without being invoked when there is no data.
            if let Some(current) = record.data.take() {
                record.data = Some(adjustment.apply(current));
            }
            record
        }

        Command::DependencyInvalidate { snapshot, mode } => {
            let base = match mode {
                InvalidationMode::Clear => ResourceRecord::empty(),
                InvalidationMode::Stale => ResourceRecord {
                    is_manually_stale: true,
                    ..record
                },
            };
            ResourceRecord {
                dependency_snapshot: snapshot,
                ..base
            }
        }

        Command::SyncDependencies(snapshot) => ResourceRecord {
            dependency_snapshot: snapshot,
            ..record
        },
    }
}

/// Apply a sequence of commands in order.
pub fn apply_all<T, I>(record: ResourceRecord<T>, commands: I) -> ResourceRecord<T>
where
    I: IntoIterator<Item = Command<T>>,
{
    commands.into_iter().fold(record, apply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Adjustment;
    use crate::error::FetchError;
    use crate::record::DependencyValues;
    use crate::Timestamp;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_000 + secs, 0).unwrap()
    }

    fn loaded(value: Value) -> ResourceRecord<Value> {
        apply_all(
            ResourceRecord::empty(),
            [
                Command::FetchStarted,
                Command::FetchSucceeded { value, at: at(0) },
            ],
        )
    }

    fn snapshot(pairs: &[(&str, Value)]) -> DependencyValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_fetch_started_sets_loading_only() {
        let record = apply(loaded(json!("One")), Command::FetchStarted);
        assert!(record.is_loading());
        assert_eq!(record.data(), Some(&json!("One")));
    }

    #[test]
    fn test_fetch_succeeded_resets_error_and_stale() {
        let record = apply_all(
            ResourceRecord::empty(),
            [
                Command::FetchFailed {
                    error: FetchError::permanent("error!"),
                    at: at(0),
                },
                Command::MarkStale,
                Command::FetchStarted,
                Command::FetchSucceeded {
                    value: json!("One"),
                    at: at(5),
                },
            ],
        );

        assert_eq!(record.data(), Some(&json!("One")));
        assert!(!record.is_loading());
        assert!(record.error().is_none());
        assert!(!record.error_is_permanent());
        assert!(!record.is_manually_stale());
        assert_eq!(record.last_success_at(), Some(at(5)));
        assert_eq!(record.last_failure_at(), Some(at(0)));
        assert!(record.is_consistent());
    }

    #[test]
    fn test_fetch_succeeded_with_null_is_present() {
        let record = loaded(Value::Null);
        assert!(record.is_present());
        assert_eq!(record.data(), Some(&Value::Null));
    }

    #[test]
    fn test_fetch_failed_keeps_existing_data() {
        let record = apply_all(
            loaded(json!("One")),
            [
                Command::FetchStarted,
                Command::FetchFailed {
                    error: FetchError::transient("error!"),
                    at: at(3),
                },
            ],
        );

        assert_eq!(record.data(), Some(&json!("One")));
        assert_eq!(record.last_success_at(), Some(at(0)));
        assert_eq!(record.error(), Some(&FetchError::transient("error!")));
        assert!(!record.error_is_permanent());
        assert_eq!(record.last_failure_at(), Some(at(3)));
        assert!(!record.is_loading());
    }

    #[test]
    fn test_fetch_failed_takes_permanence_from_error() {
        let record: ResourceRecord<Value> = apply(
            ResourceRecord::empty(),
            Command::FetchFailed {
                error: FetchError::permanent("error!"),
                at: at(0),
            },
        );
        assert!(record.error_is_permanent());
    }

    #[test]
    fn test_clear_resets_everything() {
        let record = apply_all(
            loaded(json!("One")),
            [
                Command::SyncDependencies(snapshot(&[("currentPage", json!(1))])),
                Command::MarkStale,
                Command::FetchStarted,
                Command::Clear,
            ],
        );
        assert_eq!(record, ResourceRecord::empty());
    }

    #[test]
    fn test_mark_stale_only_touches_flag() {
        let before = loaded(json!("One"));
        let after = apply(before.clone(), Command::MarkStale);
        assert!(after.is_manually_stale());
        assert_eq!(
            ResourceRecord {
                is_manually_stale: false,
                ..after
            },
            before
        );
    }

    #[test]
    fn test_adjust_replaces_present_data() {
        let record = apply(
            loaded(json!("One")),
            Command::Adjust(Adjustment::replace(json!("foobar"))),
        );
        assert_eq!(record.data(), Some(&json!("foobar")));
    }

    #[test]
    fn test_adjust_transforms_present_data() {
        let record = apply(
            loaded(json!("One")),
            Command::Adjust(Adjustment::transform(|value: Value| {
                let text = value.as_str().unwrap_or_default();
                json!(format!("{text}:{text}"))
            })),
        );
        assert_eq!(record.data(), Some(&json!("One:One")));
    }

    #[test]
    fn test_adjust_without_data_never_invokes_transform() {
        let record: ResourceRecord<Value> = apply(
            ResourceRecord::empty(),
            Command::Adjust(Adjustment::transform(|_: Value| -> Value {
                panic!("I should not be called")
            })),
        );
        assert_eq!(record, ResourceRecord::empty());

        let record: ResourceRecord<Value> = apply(
            ResourceRecord::empty(),
            Command::Adjust(Adjustment::replace(json!("XX"))),
        );
        assert!(!record.is_present());
    }

    #[test]
    fn test_dependency_invalidate_clear() {
        let next = snapshot(&[("currentPage", json!(2))]);
        let record = apply(
            loaded(json!("One")),
            Command::DependencyInvalidate {
                snapshot: next.clone(),
                mode: InvalidationMode::Clear,
            },
        );
        assert!(!record.is_present());
        assert_eq!(record.last_success_at(), None);
        assert_eq!(record.dependency_snapshot(), &next);
    }

    #[test]
    fn test_dependency_invalidate_stale_keeps_data() {
        let next = snapshot(&[("currentPage", json!(2))]);
        let record = apply(
            loaded(json!("One")),
            Command::DependencyInvalidate {
                snapshot: next.clone(),
                mode: InvalidationMode::Stale,
            },
        );
        assert_eq!(record.data(), Some(&json!("One")));
        assert!(record.is_manually_stale());
        assert_eq!(record.dependency_snapshot(), &next);
    }

    #[test]
    fn test_sync_dependencies_only_touches_snapshot() {
        let before = loaded(json!("One"));
        let next = snapshot(&[("pageSize", json!(10))]);
        let after = apply(before.clone(), Command::SyncDependencies(next.clone()));
        assert_eq!(after.dependency_snapshot(), &next);
        assert_eq!(
            ResourceRecord {
                dependency_snapshot: DependencyValues::new(),
                ..after
            },
            before
        );
    }

    #[test]
    fn test_fetch_abandoned_clears_loading_only() {
        let record = apply_all(
            loaded(json!("One")),
            [Command::FetchStarted, Command::FetchAbandoned],
        );
        assert_eq!(record, loaded(json!("One")));
    }
}
