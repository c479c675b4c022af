//! Dependency evaluation.
//!
//! Resolves the configured dependency keys against external state, decides
//! whether the resource is fetchable, and turns value changes into commands.
//!
//! # Change rules
//!
//! - Blank means absent or JSON `null`; two blanks are equal.
//! - A required key moving from blank to a value is *newly available*, not a
//!   change, as long as the record is a blank slate (see
//!   [`ResourceRecord::is_blank_slate`]). Once anything was fetched, the same
//!   move is a change: `1 -> blank -> 2` invalidates what page 1 loaded.
//! - Any other difference is a change. Once every required key is
//!   satisfied, changes invalidate the record: `Stale` if any changed key has
//!   `stale_on_change`, otherwise `Clear`.
//! - Differences that do not invalidate still update the stored snapshot.

use crate::command::{Command, InvalidationMode};
use crate::config::{DependencyKey, ResourcePolicy};
use crate::record::{DependencyValues, ResourceRecord};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

/// Reads dependency values out of external state.
pub trait DependencyResolver {
    /// Current value for `key`, or `None` when the state has no such value.
    fn resolve(&self, key: &str) -> Option<Value>;
}

impl DependencyResolver for BTreeMap<String, Value> {
    fn resolve(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }
}

impl<S: BuildHasher> DependencyResolver for HashMap<String, Value, S> {
    fn resolve(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }
}

impl DependencyResolver for serde_json::Map<String, Value> {
    fn resolve(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }
}

impl<R: DependencyResolver + ?Sized> DependencyResolver for &R {
    fn resolve(&self, key: &str) -> Option<Value> {
        (**self).resolve(key)
    }
}

/// Resolver backed by a closure, see [`resolver_fn`].
#[derive(Debug, Clone, Copy)]
pub struct FnResolver<F>(pub F);

impl<F> DependencyResolver for FnResolver<F>
where
    F: Fn(&str) -> Option<Value>,
{
    fn resolve(&self, key: &str) -> Option<Value> {
        (self.0)(key)
    }
}

/// Wrap a closure as a [`DependencyResolver`].
pub fn resolver_fn<F>(f: F) -> FnResolver<F>
where
    F: Fn(&str) -> Option<Value>,
{
    FnResolver(f)
}

/// True when a value counts as blank (absent or `null`).
pub fn is_blank(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Resolve every configured key. Blank keys are stored as `null`.
pub fn resolve<R>(policy: &ResourcePolicy, resolver: &R) -> DependencyValues
where
    R: DependencyResolver + ?Sized,
{
    policy
        .dependencies
        .iter()
        .map(|dep| {
            let value = resolver.resolve(&dep.key).unwrap_or(Value::Null);
            (dep.key.clone(), value)
        })
        .collect()
}

/// True when every required key has a non-blank value.
pub fn is_satisfied(policy: &ResourcePolicy, values: &DependencyValues) -> bool {
    policy
        .dependencies
        .iter()
        .all(|dep| dep.allow_blank || !is_blank(values.get(&dep.key)))
}

/// Keys whose value changed between `stored` and `next`, per the change rules.
///
/// With `blank_slate` set, a required key moving from blank to a value is
/// newly available and not reported.
pub fn changed_keys<'a>(
    policy: &'a ResourcePolicy,
    stored: &DependencyValues,
    next: &DependencyValues,
    blank_slate: bool,
) -> Vec<&'a DependencyKey> {
    policy
        .dependencies
        .iter()
        .filter(|dep| {
            let before = stored.get(&dep.key);
            let after = next.get(&dep.key);
            if same_value(before, after) {
                return false;
            }
            dep.allow_blank || !blank_slate || !is_blank(before)
        })
        .collect()
}

/// Compare external state against the snapshot stored in `record`.
///
/// Returns `None` when nothing differs, `SyncDependencies` when values moved
/// without invalidating anything, and `DependencyInvalidate` otherwise.
pub fn evaluate<T, R>(
    policy: &ResourcePolicy,
    record: &ResourceRecord<T>,
    resolver: &R,
) -> Option<Command<T>>
where
    R: DependencyResolver + ?Sized,
{
    let stored = record.dependency_snapshot();
    let next = resolve(policy, resolver);

    let differs = policy
        .dependencies
        .iter()
        .any(|dep| !same_value(stored.get(&dep.key), next.get(&dep.key)));
    if !differs {
        return None;
    }

    if !is_satisfied(policy, &next) {
        return Some(Command::SyncDependencies(next));
    }

    let changed = changed_keys(policy, stored, &next, record.is_blank_slate());
    if changed.is_empty() {
        return Some(Command::SyncDependencies(next));
    }

    let mode = if changed.iter().any(|dep| dep.stale_on_change) {
        InvalidationMode::Stale
    } else {
        InvalidationMode::Clear
    };
    Some(Command::DependencyInvalidate {
        snapshot: next,
        mode,
    })
}

fn same_value(a: Option<&Value>, b: Option<&Value>) -> bool {
    (is_blank(a) && is_blank(b)) || a == b
}
