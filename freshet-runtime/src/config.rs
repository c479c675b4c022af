//! Resource configuration: the validated policy plus the fetch capability.

use crate::fetch::{fetch_fn, FetchContext, FetchOperation};
use freshet_core::{
    ConfigError, DependencyKey, FetchError, Interval, ResourcePolicy, ResourceSettings,
};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Everything needed to host one resource.
///
/// Built through [`ResourceConfig::builder`]; a built config is always valid.
pub struct ResourceConfig<T> {
    policy: ResourcePolicy,
    fetch: Arc<dyn FetchOperation<T>>,
    initial_data: Option<T>,
}

impl<T> ResourceConfig<T> {
    pub fn builder() -> ResourceConfigBuilder<T> {
        ResourceConfigBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.policy.name
    }

    pub fn policy(&self) -> &ResourcePolicy {
        &self.policy
    }

    pub fn fetch_operation(&self) -> &Arc<dyn FetchOperation<T>> {
        &self.fetch
    }

    pub fn initial_data(&self) -> Option<&T> {
        self.initial_data.as_ref()
    }

    pub(crate) fn into_parts(self) -> (ResourcePolicy, Arc<dyn FetchOperation<T>>, Option<T>) {
        (self.policy, self.fetch, self.initial_data)
    }
}

impl<T: fmt::Debug> fmt::Debug for ResourceConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceConfig")
            .field("policy", &self.policy)
            .field("initial_data", &self.initial_data)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ResourceConfig`].
pub struct ResourceConfigBuilder<T> {
    name: Option<String>,
    fetch: Option<Arc<dyn FetchOperation<T>>>,
    stale_after: Interval,
    retry_after: Interval,
    expire_after: Interval,
    dependencies: Vec<DependencyKey>,
    initial_data: Option<T>,
}

impl<T> Default for ResourceConfigBuilder<T> {
    fn default() -> Self {
        Self {
            name: None,
            fetch: None,
            stale_after: Interval::Never,
            retry_after: Interval::Never,
            expire_after: Interval::Never,
            dependencies: Vec::new(),
            initial_data: None,
        }
    }
}

impl<T> ResourceConfigBuilder<T> {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn fetch_operation(mut self, operation: impl FetchOperation<T> + 'static) -> Self {
        self.fetch = Some(Arc::new(operation));
        self
    }

    /// Share an operation between several resources.
    pub fn fetch_operation_arc(mut self, operation: Arc<dyn FetchOperation<T>>) -> Self {
        self.fetch = Some(operation);
        self
    }

    pub fn stale_after(mut self, interval: impl Into<Interval>) -> Self {
        self.stale_after = interval.into();
        self
    }

    pub fn retry_after(mut self, interval: impl Into<Interval>) -> Self {
        self.retry_after = interval.into();
        self
    }

    pub fn expire_after(mut self, interval: impl Into<Interval>) -> Self {
        self.expire_after = interval.into();
        self
    }

    pub fn dependency(mut self, dependency: impl Into<DependencyKey>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn dependencies<I, D>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<DependencyKey>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Take name, intervals and dependencies from an existing policy.
    pub fn policy(mut self, policy: ResourcePolicy) -> Self {
        self.name = Some(policy.name);
        self.stale_after = policy.stale_after;
        self.retry_after = policy.retry_after;
        self.expire_after = policy.expire_after;
        self.dependencies = policy.dependencies;
        self
    }

    /// Take everything but the fetch operation from a settings file.
    ///
    /// A blank name in the settings keeps the name set on the builder.
    pub fn settings(mut self, settings: ResourceSettings) -> Self {
        if !settings.name.trim().is_empty() {
            self.name = Some(settings.name);
        }
        self.stale_after = Interval::from_millis_opt(settings.stale_after_ms);
        self.retry_after = Interval::from_millis_opt(settings.retry_after_ms);
        self.expire_after = Interval::from_millis_opt(settings.expire_after_ms);
        self.dependencies = settings.dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Seed data applied once when the resource is hosted.
    pub fn initial_data(mut self, data: T) -> Self {
        self.initial_data = Some(data);
        self
    }

    /// Validate and build.
    ///
    /// Fails when `name` or the fetch operation is missing, or when the
    /// policy is invalid.
    pub fn build(self) -> Result<ResourceConfig<T>, ConfigError> {
        let name = self
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "name".to_string(),
            })?;
        let fetch = self.fetch.ok_or_else(|| ConfigError::MissingRequired {
            field: "fetch_operation".to_string(),
        })?;

        let policy = ResourcePolicy::new(name)
            .with_stale_after(self.stale_after)
            .with_retry_after(self.retry_after)
            .with_expire_after(self.expire_after)
            .with_dependencies(self.dependencies);
        policy.validate()?;

        Ok(ResourceConfig {
            policy,
            fetch,
            initial_data: self.initial_data,
        })
    }
}

impl<T: Send + 'static> ResourceConfigBuilder<T> {
    /// Use an async closure as the fetch operation.
    pub fn fetch_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(FetchContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        self.fetch_operation(fetch_fn(f))
    }
}

impl<T> fmt::Debug for ResourceConfigBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceConfigBuilder")
            .field("name", &self.name)
            .field("has_fetch_operation", &self.fetch.is_some())
            .field("stale_after", &self.stale_after)
            .field("retry_after", &self.retry_after)
            .field("expire_after", &self.expire_after)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}
