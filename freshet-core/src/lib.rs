//! Freshet Core - Single-Resource Cache Engine
//!
//! Pure data structures and pure functions describing the lifecycle of one
//! piece of asynchronously fetched data. Nothing in this crate runs a timer
//! or touches the network:
//!
//! - [`ResourceRecord`] is the only persisted state (timestamps and flags).
//! - [`transition::apply`] reacts to a [`Command`] and returns the next record.
//! - [`view::compute_view`] combines a record, a [`ResourcePolicy`] and the
//!   current time into a [`ResourceView`] ("stale", "ready for retry",
//!   "pending for fetch", ...).
//! - [`dependency::evaluate`] compares external dependency values with the
//!   stored snapshot and may synthesize an invalidation command.
//!
//! Everything time-based is recomputed on demand from stored timestamps
//! against a caller-supplied `now`.

pub mod command;
pub mod config;
pub mod dependency;
pub mod error;
pub mod interval;
pub mod record;
pub mod transition;
pub mod view;

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub use command::{Adjustment, Command, InvalidationMode};
pub use config::{DependencyKey, DependencySetting, ResourcePolicy, ResourceSettings};
pub use dependency::{resolver_fn, DependencyResolver, FnResolver};
pub use error::{ConfigError, FetchError};
pub use interval::Interval;
pub use record::{DependencyValues, ResourceRecord};
pub use view::{ResourceView, ViewFlags};
