//! The pure view function `(record, policy, now) -> view`.
//!
//! Views are never stored. Every read recomputes them from the record's
//! timestamps and the caller's `now`, which is what lets staleness, expiry
//! and retry readiness change without any timer.
//!
//! # Expiry
//!
//! Once present data outlives `expire_after`, the view reports the resource
//! as if it had been cleared: no data, no error, not stale. The stored error
//! is masked too, because a failed refetch layered on aged data is no reason
//! to keep showing a failure for data that is gone.
//!
//! # Pending for fetch
//!
//! A fetch is wanted when dependencies are satisfied, nothing is loading,
//! and the resource is empty, stale, or due for a retry. An unexpired error
//! blocks fetching until it becomes retryable; a permanent one blocks it
//! until the record is cleared, invalidated, or expires.

use crate::config::ResourcePolicy;
use crate::dependency;
use crate::error::FetchError;
use crate::record::{DependencyValues, ResourceRecord};
use crate::Timestamp;
use serde::Serialize;

/// Every derived boolean of a view, without cloning any data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewFlags {
    pub is_present: bool,
    pub is_loading: bool,
    pub is_expired: bool,
    pub has_error: bool,
    pub error_is_permanent: bool,
    pub is_stale: bool,
    pub is_ready_for_retry: bool,
    pub retry_at: Option<Timestamp>,
    pub dependencies_satisfied: bool,
    pub is_pending_for_fetch: bool,
}

impl ViewFlags {
    /// Derive the flags for `record` at `now`.
    pub fn derive<T>(record: &ResourceRecord<T>, policy: &ResourcePolicy, now: Timestamp) -> Self {
        let is_expired = is_expired(record, policy, now);

        let is_present = !is_expired && record.is_present();
        let has_error = !is_expired && record.has_error();
        let error_is_permanent = has_error && record.error_is_permanent();

        let is_stale = is_present
            && (record.is_manually_stale()
                || record
                    .last_success_at()
                    .is_some_and(|at| policy.stale_after.has_elapsed(at, now)));

        let is_ready_for_retry = has_error
            && !error_is_permanent
            && record
                .last_failure_at()
                .is_some_and(|at| policy.retry_after.has_elapsed(at, now));

        // Follows the error it belongs to: absent once expiry masks it.
        let retry_at = if has_error && !error_is_permanent {
            record
                .last_failure_at()
                .and_then(|at| policy.retry_after.deadline(at))
        } else {
            None
        };

        let dependencies_satisfied =
            dependency::is_satisfied(policy, record.dependency_snapshot());

        let blocked_by_error = has_error && !is_ready_for_retry;
        let wants_data = !is_present || is_stale || is_ready_for_retry;
        let is_pending_for_fetch =
            dependencies_satisfied && !record.is_loading() && !blocked_by_error && wants_data;

        Self {
            is_present,
            is_loading: record.is_loading(),
            is_expired,
            has_error,
            error_is_permanent,
            is_stale,
            is_ready_for_retry,
            retry_at,
            dependencies_satisfied,
            is_pending_for_fetch,
        }
    }
}

/// Everything a consumer reads about a resource at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceView<T> {
    /// Present data (a present `null` stays `Some`)
    pub data: Option<T>,
    pub is_present: bool,
    pub is_loading: bool,
    pub is_pending_for_fetch: bool,
    pub error: Option<FetchError>,
    pub error_is_permanent: bool,
    pub is_stale: bool,
    pub is_expired: bool,
    pub is_ready_for_retry: bool,
    pub retry_at: Option<Timestamp>,
    pub dependency_values: DependencyValues,
    pub dependencies_satisfied: bool,
}

/// Compute the full view of `record` at `now`.
pub fn compute_view<T: Clone>(
    record: &ResourceRecord<T>,
    policy: &ResourcePolicy,
    now: Timestamp,
) -> ResourceView<T> {
    let flags = ViewFlags::derive(record, policy, now);

    ResourceView {
        data: if flags.is_present {
            record.data().cloned()
        } else {
            None
        },
        is_present: flags.is_present,
        is_loading: flags.is_loading,
        is_pending_for_fetch: flags.is_pending_for_fetch,
        error: if flags.has_error {
            record.error().cloned()
        } else {
            None
        },
        error_is_permanent: flags.error_is_permanent,
        is_stale: flags.is_stale,
        is_expired: flags.is_expired,
        is_ready_for_retry: flags.is_ready_for_retry,
        retry_at: flags.retry_at,
        dependency_values: record.dependency_snapshot().clone(),
        dependencies_satisfied: flags.dependencies_satisfied,
    }
}

/// True when present data has outlived `expire_after`.
pub fn is_expired<T>(record: &ResourceRecord<T>, policy: &ResourcePolicy, now: Timestamp) -> bool {
    record.is_present()
        && record
            .last_success_at()
            .is_some_and(|at| policy.expire_after.has_elapsed(at, now))
}

/// Shorthand for `ViewFlags::derive(..).is_pending_for_fetch`.
pub fn is_pending_for_fetch<T>(
    record: &ResourceRecord<T>,
    policy: &ResourcePolicy,
    now: Timestamp,
) -> bool {
    ViewFlags::derive(record, policy, now).is_pending_for_fetch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::config::DependencyKey;
    use crate::interval::Interval;
    use crate::transition::apply_all;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_000 + secs, 0).unwrap()
    }

    fn policy() -> ResourcePolicy {
        ResourcePolicy::new("testResource")
    }

    fn success(value: Value, secs: i64) -> [Command<Value>; 2] {
        [
            Command::FetchStarted,
            Command::FetchSucceeded {
                value,
                at: at(secs),
            },
        ]
    }

    fn failure(error: FetchError, secs: i64) -> [Command<Value>; 2] {
        [
            Command::FetchStarted,
            Command::FetchFailed {
                error,
                at: at(secs),
            },
        ]
    }

    fn record(commands: impl IntoIterator<Item = Command<Value>>) -> ResourceRecord<Value> {
        apply_all(ResourceRecord::empty(), commands)
    }

    #[test]
    fn test_initial_view_is_pending() {
        let view = compute_view(&record([]), &policy(), at(0));
        assert_eq!(view.data, None);
        assert!(!view.is_present);
        assert!(!view.is_loading);
        assert!(view.is_pending_for_fetch);
        assert_eq!(view.error, None);
        assert!(!view.error_is_permanent);
        assert!(!view.is_stale);
        assert!(!view.is_ready_for_retry);
        assert_eq!(view.retry_at, None);
    }

    #[test]
    fn test_loading_is_not_pending() {
        let view = compute_view(&record([Command::FetchStarted]), &policy(), at(0));
        assert!(view.is_loading);
        assert!(!view.is_pending_for_fetch);
    }

    #[test]
    fn test_loaded_is_not_pending() {
        let view = compute_view(&record(success(json!("One"), 0)), &policy(), at(0));
        assert_eq!(view.data, Some(json!("One")));
        assert!(view.is_present);
        assert!(!view.is_pending_for_fetch);
    }

    #[test]
    fn test_null_data_is_present() {
        let view = compute_view(&record(success(Value::Null, 0)), &policy(), at(0));
        assert_eq!(view.data, Some(Value::Null));
        assert!(view.is_present);
        assert!(!view.is_pending_for_fetch);
    }

    #[test]
    fn test_error_without_retry_blocks_fetch() {
        let view = compute_view(
            &record(failure(FetchError::transient("error!"), 0)),
            &policy(),
            at(1_000),
        );
        assert_eq!(view.error, Some(FetchError::transient("error!")));
        assert!(!view.is_pending_for_fetch);
        assert!(!view.is_ready_for_retry);
        assert_eq!(view.retry_at, None);
    }

    #[test]
    fn test_error_on_refetch_keeps_data() {
        let commands = success(json!("One"), 0)
            .into_iter()
            .chain(failure(FetchError::transient("error!"), 1));
        let view = compute_view(&record(commands), &policy(), at(2));
        assert_eq!(view.data, Some(json!("One")));
        assert_eq!(view.error, Some(FetchError::transient("error!")));
        assert!(!view.is_pending_for_fetch);
    }

    #[test]
    fn test_retry_after_interval() {
        let policy = policy().with_retry_after(Interval::from_secs(10));
        let record = record(failure(FetchError::transient("error!"), 0));

        let view = compute_view(&record, &policy, at(9));
        assert!(!view.is_pending_for_fetch);
        assert!(!view.is_ready_for_retry);
        assert_eq!(view.retry_at, Some(at(10)));

        let view = compute_view(&record, &policy, at(11));
        assert!(view.is_pending_for_fetch);
        assert!(view.is_ready_for_retry);
        assert_eq!(view.error, Some(FetchError::transient("error!")));
    }

    #[test]
    fn test_permanent_error_never_retries() {
        let policy = policy().with_retry_after(Interval::from_secs(10));
        let record = record(failure(FetchError::permanent("error!"), 0));

        let view = compute_view(&record, &policy, at(15));
        assert!(view.error_is_permanent);
        assert!(!view.is_ready_for_retry);
        assert!(!view.is_pending_for_fetch);
        assert_eq!(view.retry_at, None);
    }

    #[test]
    fn test_manual_stale() {
        let policy = policy().with_stale_after(Interval::from_secs(15));
        let record = record(
            success(json!("One"), 0)
                .into_iter()
                .chain([Command::MarkStale]),
        );

        for now in [at(0), at(16)] {
            let view = compute_view(&record, &policy, now);
            assert_eq!(view.data, Some(json!("One")));
            assert!(view.is_stale);
            assert!(view.is_pending_for_fetch);
        }
    }

    #[test]
    fn test_stale_with_timer() {
        let policy = policy().with_stale_after(Interval::from_secs(15));
        let record = record(success(json!("One"), 0));

        let view = compute_view(&record, &policy, at(14));
        assert!(!view.is_stale);
        assert!(!view.is_pending_for_fetch);

        let view = compute_view(&record, &policy, at(16));
        assert_eq!(view.data, Some(json!("One")));
        assert!(view.is_present);
        assert!(view.is_stale);
        assert!(view.is_pending_for_fetch);
    }

    #[test]
    fn test_stale_and_loading_is_not_pending() {
        let policy = policy().with_stale_after(Interval::from_secs(15));
        let record = record(
            success(json!("One"), 0)
                .into_iter()
                .chain([Command::FetchStarted]),
        );
        let view = compute_view(&record, &policy, at(16));
        assert!(view.is_stale);
        assert!(!view.is_pending_for_fetch);
    }

    #[test]
    fn test_expiry_masks_data() {
        let policy = policy().with_expire_after(Interval::from_secs(20));
        let record = record(success(json!("One"), 0));

        let view = compute_view(&record, &policy, at(19));
        assert!(view.is_present);

        let view = compute_view(&record, &policy, at(21));
        assert_eq!(view.data, None);
        assert!(!view.is_present);
        assert!(view.is_expired);
        assert!(view.is_pending_for_fetch);
        assert!(!view.is_stale);
    }

    #[test]
    fn test_expiry_ignores_records_without_data() {
        let policy = policy().with_expire_after(Interval::from_secs(20));
        let record = record(failure(FetchError::transient("error!"), 0));

        let view = compute_view(&record, &policy, at(21));
        assert!(!view.is_expired);
        assert_eq!(view.error, Some(FetchError::transient("error!")));
        assert!(!view.is_pending_for_fetch);
    }

    #[test]
    fn test_expiry_masks_errors_layered_on_data() {
        let policy = policy()
            .with_expire_after(Interval::from_secs(20))
            .with_retry_after(Interval::from_secs(10));
        for error in [FetchError::transient("error!"), FetchError::permanent("error!")] {
            let commands = success(json!("One"), 0)
                .into_iter()
                .chain(failure(error, 1));
            let view = compute_view(&record(commands), &policy, at(21));
            assert_eq!(view.data, None);
            assert_eq!(view.error, None);
            assert!(!view.error_is_permanent);
            assert!(!view.is_ready_for_retry);
            assert_eq!(view.retry_at, None);
            assert!(view.is_pending_for_fetch);
        }

        // Before expiry the transient error carries its deadline.
        let commands = success(json!("One"), 0)
            .into_iter()
            .chain(failure(FetchError::transient("error!"), 1));
        let view = compute_view(&record(commands), &policy, at(19));
        assert_eq!(view.retry_at, Some(at(11)));
    }

    #[test]
    fn test_expiry_masks_manual_stale() {
        let policy = policy().with_expire_after(Interval::from_secs(20));
        let record = record(
            success(json!("One"), 0)
                .into_iter()
                .chain([Command::MarkStale]),
        );
        let view = compute_view(&record, &policy, at(21));
        assert!(!view.is_stale);
    }

    #[test]
    fn test_unsatisfied_dependencies_block_fetch() {
        let policy = policy().with_dependency("currentPage");
        let view = compute_view(&record([]), &policy, at(0));
        assert!(!view.dependencies_satisfied);
        assert!(!view.is_pending_for_fetch);

        let snapshot = DependencyValues::from([("currentPage".to_string(), json!(1))]);
        let view = compute_view(
            &record([Command::SyncDependencies(snapshot.clone())]),
            &policy,
            at(0),
        );
        assert!(view.dependencies_satisfied);
        assert!(view.is_pending_for_fetch);
        assert_eq!(view.dependency_values, snapshot);
    }

    #[test]
    fn test_allow_blank_dependency_is_pending_immediately() {
        let policy = policy().with_dependency(DependencyKey::new("currentPage").allow_blank());
        assert!(is_pending_for_fetch(&record([]), &policy, at(0)));
    }

    #[test]
    fn test_flags_match_view() {
        let policy = policy()
            .with_stale_after(Interval::from_secs(5))
            .with_retry_after(Interval::from_secs(3));
        let commands = success(json!("One"), 0)
            .into_iter()
            .chain(failure(FetchError::transient("error!"), 2));
        let record = record(commands);
        let now = at(6);

        let flags = ViewFlags::derive(&record, &policy, now);
        let view = compute_view(&record, &policy, now);
        assert_eq!(flags.is_stale, view.is_stale);
        assert_eq!(flags.is_ready_for_retry, view.is_ready_for_retry);
        assert_eq!(flags.is_pending_for_fetch, view.is_pending_for_fetch);
        assert!(view.is_stale && view.is_ready_for_retry && view.is_pending_for_fetch);
    }
}
