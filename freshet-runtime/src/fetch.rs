//! The fetch capability and what it is handed.

use crate::orchestrator::FetchTicket;
use async_trait::async_trait;
use freshet_core::{DependencyValues, FetchError, Timestamp};
use serde_json::Value;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

// ============================================================================
// SERVICES
// ============================================================================

/// Type-keyed registry of external services injected into every fetch.
///
/// Holds at most one service per type. Cloning is cheap: entries are shared.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, (&'static str, Arc<dyn Any + Send + Sync>)>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service`, replacing any earlier one of the same type.
    pub fn with<S: Any + Send + Sync>(self, service: S) -> Self {
        self.with_arc(Arc::new(service))
    }

    pub fn with_arc<S: Any + Send + Sync>(mut self, service: Arc<S>) -> Self {
        self.insert(service);
        self
    }

    pub fn insert<S: Any + Send + Sync>(&mut self, service: Arc<S>) {
        let service: Arc<dyn Any + Send + Sync> = service;
        self.services
            .insert(TypeId::of::<S>(), (type_name::<S>(), service));
    }

    pub fn get<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        let (_, service) = self.services.get(&TypeId::of::<S>())?;
        Arc::clone(service).downcast::<S>().ok()
    }

    pub fn contains<S: Any + Send + Sync>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<S>())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.services.values().map(|(name, _)| *name).collect();
        names.sort_unstable();
        f.debug_struct("ServiceRegistry")
            .field("services", &names)
            .finish()
    }
}

// ============================================================================
// FETCH CONTEXT
// ============================================================================

/// Input of one fetch.
#[derive(Debug, Clone)]
pub struct FetchContext {
    /// Name of the resource being fetched
    pub resource: String,
    pub ticket: FetchTicket,
    /// Host time at which the fetch was issued
    pub issued_at: Timestamp,
    /// Resolved dependency values (blank keys are `null`)
    pub dependencies: DependencyValues,
    pub services: ServiceRegistry,
}

impl FetchContext {
    /// Resolved value of a dependency key. Blank keys yield `None`.
    pub fn dependency(&self, key: &str) -> Option<&Value> {
        self.dependencies.get(key).filter(|value| !value.is_null())
    }

    pub fn service<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        self.services.get::<S>()
    }

    /// Like [`FetchContext::service`], but a missing service is a permanent
    /// failure of this fetch.
    pub fn require_service<S: Any + Send + Sync>(&self) -> Result<Arc<S>, FetchError> {
        self.service::<S>().ok_or_else(|| {
            FetchError::permanent(format!(
                "{}: service {} is not registered",
                self.resource,
                type_name::<S>()
            ))
        })
    }
}

// ============================================================================
// FETCH OPERATION
// ============================================================================

/// The asynchronous source a resource gets its data from.
///
/// Failures are returned, never raised: the host records them into the
/// resource state.
#[async_trait]
pub trait FetchOperation<T>: Send + Sync {
    async fn fetch(&self, ctx: FetchContext) -> Result<T, FetchError>;
}

/// Adapter produced by [`fetch_fn`].
pub struct FnFetch<F>(F);

#[async_trait]
impl<T, F, Fut> FetchOperation<T> for FnFetch<F>
where
    T: Send + 'static,
    F: Fn(FetchContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    async fn fetch(&self, ctx: FetchContext) -> Result<T, FetchError> {
        (self.0)(ctx).await
    }
}

impl<F> fmt::Debug for FnFetch<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnFetch(..)")
    }
}

/// Use an async closure as a [`FetchOperation`].
///
/// ```ignore
/// let op = fetch_fn(|ctx: FetchContext| async move {
///     let page = ctx.dependency("currentPage").cloned();
///     client.items(page).await.map_err(|e| FetchError::transient(e.to_string()))
/// });
/// ```
pub fn fetch_fn<T, F, Fut>(f: F) -> FnFetch<F>
where
    T: Send + 'static,
    F: Fn(FetchContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    FnFetch(f)
}
