//! The resource host: a single-writer apply loop with watch-based reads.
//!
//! One tokio task owns the record, the current time, the external
//! dependency state and the orchestrator. Everything else talks to it
//! through a [`ResourceHandle`]:
//!
//! - commands travel over an `mpsc` queue and are applied one at a time;
//!   each call returns once its command has been applied;
//! - after every change the task publishes a [`Snapshot`] on a `watch`
//!   channel, and every read computes its view from the latest snapshot.
//!
//! Fetch futures are polled by the loop itself. A completed fetch is applied
//! before the next queued command, and a newly issued fetch is polled once
//! before the command that issued it is acknowledged.

use crate::config::ResourceConfig;
use crate::error::HostError;
use crate::fetch::{FetchContext, FetchOperation, ServiceRegistry};
use crate::orchestrator::{Completion, FetchOrchestrator, FetchTicket, FetchTrigger};
use chrono::Utc;
use freshet_core::dependency;
use freshet_core::transition;
use freshet_core::view::{compute_view, ResourceView, ViewFlags};
use freshet_core::{
    Adjustment, Command, DependencyValues, FetchError, ResourcePolicy, ResourceRecord, Timestamp,
};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// Default capacity of the command queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

// ============================================================================
// OPTIONS
// ============================================================================

/// Runtime options of a hosted resource.
#[derive(Debug, Clone)]
pub struct HostOptions {
    /// Initial value of the host's current time
    pub start_time: Timestamp,
    /// Start a fetch whenever the view becomes pending
    pub auto_fetch: bool,
    /// Services handed to every fetch
    pub services: ServiceRegistry,
    /// Initial external state the dependency keys read from
    pub dependencies: DependencyValues,
    pub queue_capacity: usize,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            start_time: Utc::now(),
            auto_fetch: true,
            services: ServiceRegistry::new(),
            dependencies: DependencyValues::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl HostOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_time(mut self, start_time: Timestamp) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_auto_fetch(mut self, auto_fetch: bool) -> Self {
        self.auto_fetch = auto_fetch;
        self
    }

    pub fn with_services(mut self, services: ServiceRegistry) -> Self {
        self.services = services;
        self
    }

    pub fn with_service<S: Any + Send + Sync>(mut self, service: S) -> Self {
        self.services = self.services.with(service);
        self
    }

    pub fn with_dependency(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.dependencies.insert(key.into(), value.into());
        self
    }

    pub fn with_dependencies(mut self, values: DependencyValues) -> Self {
        self.dependencies.extend(values);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

/// What readers observe: the raw record and the time to judge it at.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub record: ResourceRecord<T>,
    pub now: Timestamp,
}

// ============================================================================
// REQUESTS
// ============================================================================

enum Request<T> {
    Apply(Command<T>),
    Fetch,
    SetTime(Timestamp),
    AdvanceTime(Duration),
    SetDependency { key: String, value: Option<Value> },
    UpdateDependencies(DependencyValues),
    Settle,
    Shutdown,
}

struct Envelope<T> {
    request: Request<T>,
    ack: oneshot::Sender<()>,
}

type FetchFuture<T> = BoxFuture<'static, (FetchTicket, Result<T, FetchError>)>;

// ============================================================================
// HOST LOOP
// ============================================================================

/// The task that owns a resource. Create one with [`ResourceHost::spawn`].
pub struct ResourceHost<T> {
    policy: Arc<ResourcePolicy>,
    fetch: Arc<dyn FetchOperation<T>>,
    services: ServiceRegistry,
    auto_fetch: bool,
    record: ResourceRecord<T>,
    now: Timestamp,
    external: DependencyValues,
    orchestrator: FetchOrchestrator,
    fetches: FuturesUnordered<FetchFuture<T>>,
    state: watch::Sender<Snapshot<T>>,
}

impl<T> ResourceHost<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start hosting a resource on the current tokio runtime.
    ///
    /// Initial data, when configured, is recorded as a success at
    /// `options.start_time`. The task runs until [`ResourceHandle::shutdown`]
    /// or until every handle is dropped.
    pub fn spawn(config: ResourceConfig<T>, options: HostOptions) -> ResourceHandle<T> {
        let (policy, fetch, initial_data) = config.into_parts();
        let policy = Arc::new(policy);
        let record = match initial_data {
            Some(data) => ResourceRecord::seeded(data, options.start_time),
            None => ResourceRecord::empty(),
        };

        let (state, state_rx) = watch::channel(Snapshot {
            record: record.clone(),
            now: options.start_time,
        });
        let (requests_tx, requests_rx) = mpsc::channel(options.queue_capacity.max(1));

        let mut host = ResourceHost {
            policy: Arc::clone(&policy),
            fetch,
            services: options.services,
            auto_fetch: options.auto_fetch,
            record,
            now: options.start_time,
            external: options.dependencies,
            orchestrator: FetchOrchestrator::new(),
            fetches: FuturesUnordered::new(),
            state,
        };
        host.start();
        tokio::spawn(host.run(requests_rx));

        ResourceHandle {
            policy,
            requests: requests_tx,
            state: state_rx,
        }
    }

    /// Bring the record in line with the initial external state, before the
    /// first handle is returned.
    #[tracing::instrument(name = "resource_host_start", skip_all, fields(resource = %self.policy.name))]
    fn start(&mut self) {
        tracing::info!(
            auto_fetch = self.auto_fetch,
            dependencies = self.policy.dependencies.len(),
            "Resource host started"
        );
        self.evaluate_dependencies();
        self.orchestrate();
        self.publish();
    }

    #[tracing::instrument(name = "resource_host", skip_all, fields(resource = %self.policy.name))]
    async fn run(mut self, mut requests: mpsc::Receiver<Envelope<T>>) {
        self.drain_ready_fetches();
        self.publish();

        loop {
            tokio::select! {
                biased;

                Some((ticket, outcome)) = self.fetches.next(), if !self.fetches.is_empty() => {
                    self.on_completion(ticket, outcome);
                    self.drain_ready_fetches();
                    self.publish();
                }

                envelope = requests.recv() => {
                    let Some(Envelope { request, ack }) = envelope else {
                        break;
                    };
                    let stop = matches!(request, Request::Shutdown);

                    self.drain_ready_fetches();
                    if !stop {
                        self.handle(request);
                        self.orchestrate();
                        self.drain_ready_fetches();
                    }
                    self.publish();

                    // The caller may have stopped waiting.
                    let _ = ack.send(());
                    if stop {
                        break;
                    }
                }
            }
        }

        tracing::info!(
            abandoned_fetches = self.orchestrator.in_flight(),
            "Resource host stopped"
        );
    }

    fn handle(&mut self, request: Request<T>) {
        match request {
            Request::Apply(Command::Clear) => {
                self.apply(Command::Clear);
                // Keep the snapshot mirroring external state after a reset.
                let values = dependency::resolve(&self.policy, &self.external);
                self.apply(Command::SyncDependencies(values));
            }
            Request::Apply(Command::Adjust(adjustment)) => {
                // Expired data reads as absent, so it is never handed to an adjustment.
                if ViewFlags::derive(&self.record, &self.policy, self.now).is_present {
                    self.apply(Command::Adjust(adjustment));
                } else {
                    tracing::debug!("No data present, adjustment dropped");
                }
            }
            Request::Apply(command) => self.apply(command),
            Request::Fetch => {
                if self.orchestrator.may_start_manual(self.record.is_loading()) {
                    self.start_fetch(FetchTrigger::Manual);
                } else {
                    tracing::debug!("Fetch requested while loading, ignored");
                }
            }
            Request::SetTime(now) => self.set_time(now),
            Request::AdvanceTime(by) => match chrono::Duration::from_std(by)
                .ok()
                .and_then(|delta| self.now.checked_add_signed(delta))
            {
                Some(now) => self.set_time(now),
                None => tracing::warn!(advance = ?by, "Time advance out of range, ignored"),
            },
            Request::SetDependency { key, value } => {
                match value {
                    Some(value) => self.external.insert(key, value),
                    None => self.external.remove(&key),
                };
                self.evaluate_dependencies();
            }
            Request::UpdateDependencies(values) => {
                self.external.extend(values);
                self.evaluate_dependencies();
            }
            Request::Settle | Request::Shutdown => {}
        }
    }

    fn apply(&mut self, command: Command<T>) {
        tracing::debug!(command = command.kind(), "Applying command");
        if command.supersedes_fetch() {
            if let Some(ticket) = self.orchestrator.supersede() {
                tracing::debug!(%ticket, "In-flight fetch superseded");
            }
        }
        let record = std::mem::take(&mut self.record);
        self.record = transition::apply(record, command);
    }

    fn set_time(&mut self, now: Timestamp) {
        if now < self.now {
            tracing::warn!(from = %self.now, to = %now, "Current time moved backwards");
        }
        self.now = now;
    }

    fn evaluate_dependencies(&mut self) {
        let command = dependency::evaluate(&self.policy, &self.record, &self.external);
        match command {
            Some(Command::DependencyInvalidate { snapshot, mode }) => {
                tracing::debug!(%mode, "Dependency change invalidates resource");
                self.apply(Command::DependencyInvalidate { snapshot, mode });
            }
            Some(command) => {
                tracing::debug!(
                    satisfied = dependency::is_satisfied(&self.policy, &self.external_snapshot()),
                    "Dependency values updated"
                );
                self.apply(command);
            }
            None => {}
        }
    }

    fn external_snapshot(&self) -> DependencyValues {
        dependency::resolve(&self.policy, &self.external)
    }

    fn orchestrate(&mut self) {
        if !self.auto_fetch {
            return;
        }
        let flags = ViewFlags::derive(&self.record, &self.policy, self.now);
        if self.orchestrator.should_auto_fetch(&flags) {
            self.start_fetch(FetchTrigger::Auto);
        }
    }

    fn start_fetch(&mut self, trigger: FetchTrigger) {
        let ticket = self.orchestrator.begin();
        self.apply(Command::FetchStarted);

        let ctx = FetchContext {
            resource: self.policy.name.clone(),
            ticket,
            issued_at: self.now,
            dependencies: self.external_snapshot(),
            services: self.services.clone(),
        };
        tracing::info!(%ticket, %trigger, "Fetch started");

        let operation = Arc::clone(&self.fetch);
        self.fetches
            .push(async move { (ticket, operation.fetch(ctx).await) }.boxed());
    }

    fn on_completion(&mut self, ticket: FetchTicket, outcome: Result<T, FetchError>) {
        match self.orchestrator.complete(ticket) {
            Completion::Applied => match outcome {
                Ok(value) => {
                    tracing::info!(%ticket, "Fetch succeeded");
                    self.apply(Command::FetchSucceeded {
                        value,
                        at: self.now,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        %ticket,
                        permanent = error.is_permanent(),
                        error = %error,
                        "Fetch failed"
                    );
                    self.apply(Command::FetchFailed {
                        error,
                        at: self.now,
                    });
                }
            },
            Completion::Superseded => {
                tracing::debug!(%ticket, ok = outcome.is_ok(), "Discarding response of superseded fetch");
                if self.orchestrator.current().is_none() && self.record.is_loading() {
                    self.apply(Command::FetchAbandoned);
                }
            }
        }
        self.orchestrate();
    }

    /// Apply every completion that is already available without waiting.
    ///
    /// Also gives newly pushed fetches their first poll.
    fn drain_ready_fetches(&mut self) {
        while let Some(Some((ticket, outcome))) = self.fetches.next().now_or_never() {
            self.on_completion(ticket, outcome);
        }
    }

    fn publish(&self) {
        self.state.send_replace(Snapshot {
            record: self.record.clone(),
            now: self.now,
        });
    }
}

// ============================================================================
// HANDLE
// ============================================================================

/// Cheap, cloneable access to a hosted resource.
#[derive(Clone)]
pub struct ResourceHandle<T> {
    policy: Arc<ResourcePolicy>,
    requests: mpsc::Sender<Envelope<T>>,
    state: watch::Receiver<Snapshot<T>>,
}

impl<T> std::fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("name", &self.policy.name)
            .field("closed", &self.requests.is_closed())
            .finish()
    }
}

impl<T> ResourceHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn send(&self, request: Request<T>) -> Result<(), HostError> {
        let (ack, applied) = oneshot::channel();
        self.requests
            .send(Envelope { request, ack })
            .await
            .map_err(|_| self.closed())?;
        applied.await.map_err(|_| self.closed())
    }

    fn closed(&self) -> HostError {
        HostError::Closed {
            resource: self.policy.name.clone(),
        }
    }

    // === Commands ===

    /// Issue a fetch. A no-op while a fetch is loading.
    pub async fn fetch(&self) -> Result<(), HostError> {
        self.send(Request::Fetch).await
    }

    /// Reset the resource to empty, discarding any in-flight response.
    pub async fn clear(&self) -> Result<(), HostError> {
        self.send(Request::Apply(Command::Clear)).await
    }

    pub async fn mark_stale(&self) -> Result<(), HostError> {
        self.send(Request::Apply(Command::MarkStale)).await
    }

    /// Change present data. Without data, expired data included, the
    /// adjustment is dropped unused.
    pub async fn adjust(&self, adjustment: Adjustment<T>) -> Result<(), HostError> {
        self.send(Request::Apply(Command::Adjust(adjustment))).await
    }

    pub async fn replace(&self, value: T) -> Result<(), HostError> {
        self.adjust(Adjustment::replace(value)).await
    }

    pub async fn transform<F>(&self, f: F) -> Result<(), HostError>
    where
        F: FnOnce(T) -> T + Send + 'static,
    {
        self.adjust(Adjustment::transform(f)).await
    }

    /// Set the host's current time.
    pub async fn set_time(&self, now: Timestamp) -> Result<(), HostError> {
        self.send(Request::SetTime(now)).await
    }

    /// Move the host's current time forward.
    pub async fn advance(&self, by: Duration) -> Result<(), HostError> {
        self.send(Request::AdvanceTime(by)).await
    }

    /// Set one value of the external state dependency keys read from.
    pub async fn set_dependency(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), HostError> {
        self.send(Request::SetDependency {
            key: key.into(),
            value: Some(value.into()),
        })
        .await
    }

    /// Remove a value from the external state (it becomes blank).
    pub async fn clear_dependency(&self, key: impl Into<String>) -> Result<(), HostError> {
        self.send(Request::SetDependency {
            key: key.into(),
            value: None,
        })
        .await
    }

    /// Merge several external values at once; evaluated as one change.
    pub async fn update_dependencies(&self, values: DependencyValues) -> Result<(), HostError> {
        self.send(Request::UpdateDependencies(values)).await
    }

    /// Wait until every fetch completion delivered so far has been applied.
    pub async fn settle(&self) -> Result<(), HostError> {
        self.send(Request::Settle).await
    }

    /// Stop the host. In-flight fetches are dropped.
    pub async fn shutdown(&self) -> Result<(), HostError> {
        self.send(Request::Shutdown).await
    }

    // === Reads ===

    pub fn name(&self) -> &str {
        &self.policy.name
    }

    pub fn policy(&self) -> &ResourcePolicy {
        &self.policy
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        self.state.borrow().clone()
    }

    pub fn view(&self) -> ResourceView<T> {
        let snapshot = self.state.borrow();
        compute_view(&snapshot.record, &self.policy, snapshot.now)
    }

    pub fn flags(&self) -> ViewFlags {
        let snapshot = self.state.borrow();
        ViewFlags::derive(&snapshot.record, &self.policy, snapshot.now)
    }

    pub fn raw(&self) -> ResourceRecord<T> {
        self.state.borrow().record.clone()
    }

    pub fn data(&self) -> Option<T> {
        self.view().data
    }

    pub fn is_present(&self) -> bool {
        self.flags().is_present
    }

    pub fn is_loading(&self) -> bool {
        self.flags().is_loading
    }

    pub fn dependency_values(&self) -> DependencyValues {
        self.state.borrow().record.dependency_snapshot().clone()
    }

    pub fn error(&self) -> Option<FetchError> {
        self.view().error
    }

    pub fn error_is_permanent(&self) -> bool {
        self.flags().error_is_permanent
    }

    pub fn is_ready_for_retry(&self) -> bool {
        self.flags().is_ready_for_retry
    }

    pub fn retry_at(&self) -> Option<Timestamp> {
        self.flags().retry_at
    }

    pub fn is_stale(&self) -> bool {
        self.flags().is_stale
    }

    pub fn is_pending_for_fetch(&self) -> bool {
        self.flags().is_pending_for_fetch
    }

    pub fn now(&self) -> Timestamp {
        self.state.borrow().now
    }

    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }

    /// A receiver notified after every applied change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.state.clone()
    }

    /// Wait until the view satisfies `predicate`, returning that view.
    pub async fn wait_for<P>(&self, mut predicate: P) -> Result<ResourceView<T>, HostError>
    where
        P: FnMut(&ResourceView<T>) -> bool,
    {
        let mut state = self.state.clone();
        loop {
            let view = {
                let snapshot = state.borrow_and_update();
                compute_view(&snapshot.record, &self.policy, snapshot.now)
            };
            if predicate(&view) {
                return Ok(view);
            }
            state.changed().await.map_err(|_| self.closed())?;
        }
    }
}
