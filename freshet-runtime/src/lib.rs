//! Freshet Runtime - Hosting a Single Async Resource
//!
//! Drives the pure engine in `freshet-core` from a tokio task:
//!
//! - [`ResourceConfig`] pairs the validated policy with a [`FetchOperation`].
//! - [`ResourceHost::spawn`] starts the single-writer apply loop and returns
//!   a cloneable [`ResourceHandle`] for commands and reads.
//! - [`FetchOrchestrator`] keeps at most one current fetch per resource and
//!   discards responses of superseded fetches.
//! - [`spawn_clock`] optionally feeds wall-clock time into a host.
//!
//! # Example
//!
//! ```ignore
//! use freshet_runtime::{FetchContext, HostOptions, ResourceConfig, ResourceHost};
//!
//! let config = ResourceConfig::builder()
//!     .name("items")
//!     .stale_after(Duration::from_secs(15))
//!     .dependency("currentPage")
//!     .fetch_fn(|ctx: FetchContext| async move { load_items(ctx).await })
//!     .build()?;
//!
//! let items = ResourceHost::spawn(config, HostOptions::new());
//! items.set_dependency("currentPage", 1).await?;
//! let view = items.wait_for(|view| view.is_present).await?;
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod host;
pub mod orchestrator;

pub use clock::{run_clock, spawn_clock, DEFAULT_CLOCK_PERIOD};
pub use config::{ResourceConfig, ResourceConfigBuilder};
pub use error::{FreshetError, FreshetResult, HostError};
pub use fetch::{fetch_fn, FetchContext, FetchOperation, FnFetch, ServiceRegistry};
pub use host::{HostOptions, ResourceHandle, ResourceHost, Snapshot, DEFAULT_QUEUE_CAPACITY};
pub use orchestrator::{Completion, FetchOrchestrator, FetchTicket, FetchTrigger};

// Re-export the engine types most callers need
pub use freshet_core::{
    Adjustment, Command, ConfigError, DependencyKey, DependencyValues, FetchError, Interval,
    InvalidationMode, ResourcePolicy, ResourceRecord, ResourceSettings, ResourceView, Timestamp,
    ViewFlags,
};
