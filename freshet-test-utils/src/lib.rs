//! Freshet Test Utilities
//!
//! Shared test infrastructure for the freshet workspace:
//! - [`MockFetcher`], a fetch operation whose requests wait for the test to
//!   answer them
//! - Proptest generators for policies, errors and values
//! - Fixtures for a fixed start time and paging dependencies
//! - [`assertions::ExpectedItem`] for asserting a whole view at once
//! - [`init_test_tracing`] for log output while debugging tests

pub use freshet_core::{
    Adjustment, Command, ConfigError, DependencyKey, DependencyValues, FetchError, Interval,
    ResourcePolicy, ResourceRecord, ResourceView, Timestamp,
};
pub use freshet_runtime::{
    FetchContext, FetchOperation, HostOptions, ResourceConfig, ResourceHandle, ResourceHost,
};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{oneshot, Notify};
use tracing_subscriber::EnvFilter;

// ============================================================================
// MOCK FETCHER
// ============================================================================

struct PendingFetch<T> {
    ctx: FetchContext,
    responder: oneshot::Sender<Result<T, FetchError>>,
}

struct MockState<T> {
    pending: VecDeque<PendingFetch<T>>,
    issued: usize,
    last_context: Option<FetchContext>,
}

struct MockInner<T> {
    state: Mutex<MockState<T>>,
    arrived: Notify,
}

/// A fetch operation answered by the test.
///
/// Every fetch parks in a FIFO queue until the test calls [`resolve`],
/// [`fail`] or [`respond`], which answer the oldest parked fetch (waiting
/// for one to arrive if the queue is empty). Clones share the queue.
///
/// [`resolve`]: MockFetcher::resolve
/// [`fail`]: MockFetcher::fail
/// [`respond`]: MockFetcher::respond
pub struct MockFetcher<T> {
    inner: Arc<MockInner<T>>,
}

impl<T> MockFetcher<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockInner {
                state: Mutex::new(MockState {
                    pending: VecDeque::new(),
                    issued: 0,
                    last_context: None,
                }),
                arrived: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState<T>> {
        // A panicking test must not cascade into every later assertion.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetches waiting for an answer.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Fetches ever issued against this mock.
    pub fn issued_count(&self) -> usize {
        self.lock().issued
    }

    /// Context of the most recently issued fetch.
    pub fn last_context(&self) -> Option<FetchContext> {
        self.lock().last_context.clone()
    }

    /// Dependency values handed to the most recently issued fetch.
    pub fn last_dependencies(&self) -> Option<DependencyValues> {
        self.lock()
            .last_context
            .as_ref()
            .map(|ctx| ctx.dependencies.clone())
    }

    /// Answer the oldest pending fetch, waiting for one if needed.
    ///
    /// Returns the context of the answered fetch. The answer is dropped
    /// silently when the host stopped listening (e.g. it shut down).
    pub async fn respond(&self, outcome: Result<T, FetchError>) -> FetchContext {
        let pending = self.next_pending().await;
        let _ = pending.responder.send(outcome);
        pending.ctx
    }

    pub async fn resolve(&self, value: T) -> FetchContext {
        self.respond(Ok(value)).await
    }

    pub async fn fail(&self, error: impl Into<FetchError>) -> FetchContext {
        self.respond(Err(error.into())).await
    }

    async fn next_pending(&self) -> PendingFetch<T> {
        loop {
            let mut arrived = std::pin::pin!(self.inner.arrived.notified());
            arrived.as_mut().enable();
            if let Some(pending) = self.lock().pending.pop_front() {
                return pending;
            }
            arrived.await;
        }
    }
}

impl<T> Default for MockFetcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for MockFetcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for MockFetcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MockFetcher")
            .field("pending", &state.pending.len())
            .field("issued", &state.issued)
            .finish()
    }
}

#[async_trait]
impl<T: Send + 'static> FetchOperation<T> for MockFetcher<T> {
    async fn fetch(&self, ctx: FetchContext) -> Result<T, FetchError> {
        let (responder, response) = oneshot::channel();
        {
            let mut state = self.lock();
            state.issued += 1;
            state.last_context = Some(ctx.clone());
            state.pending.push_back(PendingFetch { ctx, responder });
        }
        self.inner.arrived.notify_waiters();

        response
            .await
            .unwrap_or_else(|_| Err(FetchError::transient("mock fetch dropped without an answer")))
    }
}

// ============================================================================
// TRACING
// ============================================================================

/// Install a test-friendly fmt subscriber (honours `RUST_LOG`).
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("freshet_runtime=debug,freshet_core=debug,warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for freshet types.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// Generate a Timestamp within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    /// Generate an interval, `Never` included.
    pub fn arb_interval() -> impl Strategy<Value = Interval> {
        prop_oneof![
            Just(Interval::Never),
            (1u64..86_400_000).prop_map(Interval::from_millis),
        ]
    }

    pub fn arb_json_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9]{0,16}".prop_map(Value::from),
        ]
    }

    pub fn arb_fetch_error() -> impl Strategy<Value = FetchError> {
        ("[a-z!]{1,12}", any::<bool>()).prop_map(|(message, permanent)| {
            if permanent {
                FetchError::permanent(message)
            } else {
                FetchError::transient(message)
            }
        })
    }

    pub fn arb_dependency_key() -> impl Strategy<Value = DependencyKey> {
        ("[a-z][a-zA-Z]{0,10}", any::<bool>(), any::<bool>()).prop_map(
            |(key, allow_blank, stale_on_change)| DependencyKey {
                key,
                allow_blank,
                stale_on_change,
            },
        )
    }

    /// Generate a valid policy (unique dependency keys).
    pub fn arb_policy() -> impl Strategy<Value = ResourcePolicy> {
        (
            arb_interval(),
            arb_interval(),
            arb_interval(),
            prop::collection::btree_map("[a-z][a-zA-Z]{0,10}", (any::<bool>(), any::<bool>()), 0..4),
        )
            .prop_map(|(stale, retry, expire, deps)| {
                ResourcePolicy::new("testResource")
                    .with_stale_after(stale)
                    .with_retry_after(retry)
                    .with_expire_after(expire)
                    .with_dependencies(deps.into_iter().map(|(key, (allow_blank, stale_on_change))| {
                        DependencyKey {
                            key,
                            allow_blank,
                            stale_on_change,
                        }
                    }))
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common testing scenarios.

    use super::*;
    use serde_json::Value;

    /// Seconds since the epoch at which scenario tests start.
    pub const START_SECS: i64 = 1_000;

    pub fn start_time() -> Timestamp {
        t(0)
    }

    /// The scenario time `secs` seconds after the start.
    pub fn t(secs: i64) -> Timestamp {
        chrono::DateTime::from_timestamp(START_SECS + secs, 0).unwrap_or_default()
    }

    /// External paging state (`currentPage`, `pageSize`).
    pub fn paging(current_page: Value, page_size: Value) -> DependencyValues {
        DependencyValues::from([
            ("currentPage".to_string(), current_page),
            ("pageSize".to_string(), page_size),
        ])
    }

    /// Options starting at [`start_time`] with auto-fetch off.
    pub fn manual_options() -> HostOptions {
        HostOptions::new()
            .with_start_time(start_time())
            .with_auto_fetch(false)
    }

    /// A `testResource` config backed by `mock`.
    pub fn mock_config<T: Send + 'static>(mock: &MockFetcher<T>) -> ResourceConfig<T> {
        let config = ResourceConfig::builder()
            .name("testResource")
            .fetch_operation(mock.clone())
            .build();
        match config {
            Ok(config) => config,
            Err(e) => panic!("fixture config is valid: {e}"),
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Whole-view assertions.

    use super::*;

    /// The observable state of a resource, compared field by field.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ExpectedItem<T> {
        pub data: Option<T>,
        pub is_loading: bool,
        pub is_present: bool,
        pub is_pending_for_fetch: bool,
        pub error: Option<FetchError>,
        pub error_is_permanent: bool,
        pub is_stale: bool,
        pub is_ready_for_retry: bool,
    }

    impl<T> ExpectedItem<T> {
        /// An empty resource waiting for its first fetch.
        pub fn initial() -> Self {
            Self {
                data: None,
                is_loading: false,
                is_present: false,
                is_pending_for_fetch: true,
                error: None,
                error_is_permanent: false,
                is_stale: false,
                is_ready_for_retry: false,
            }
        }

        /// Freshly loaded `data`.
        pub fn loaded(data: T) -> Self {
            Self {
                data: Some(data),
                is_present: true,
                is_pending_for_fetch: false,
                ..Self::initial()
            }
        }
    }

    impl<T: Clone> From<&ResourceView<T>> for ExpectedItem<T> {
        fn from(view: &ResourceView<T>) -> Self {
            Self {
                data: view.data.clone(),
                is_loading: view.is_loading,
                is_present: view.is_present,
                is_pending_for_fetch: view.is_pending_for_fetch,
                error: view.error.clone(),
                error_is_permanent: view.error_is_permanent,
                is_stale: view.is_stale,
                is_ready_for_retry: view.is_ready_for_retry,
            }
        }
    }

    /// Assert every observable field of `view` at once.
    #[track_caller]
    pub fn assert_item<T>(view: &ResourceView<T>, expected: ExpectedItem<T>)
    where
        T: Clone + fmt::Debug + PartialEq,
    {
        assert_eq!(ExpectedItem::from(view), expected);
    }
}
