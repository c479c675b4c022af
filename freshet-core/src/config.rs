//! Configuration types

use crate::error::ConfigError;
use crate::interval::Interval;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// DEPENDENCY KEYS
// ============================================================================

/// An external state value the resource's fetch depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyKey {
    pub key: String,
    /// Blank values still count as satisfied and are passed to the fetch
    #[serde(default)]
    pub allow_blank: bool,
    /// A change marks existing data stale instead of clearing it
    #[serde(default)]
    pub stale_on_change: bool,
}

impl DependencyKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            allow_blank: false,
            stale_on_change: false,
        }
    }

    pub fn allow_blank(mut self) -> Self {
        self.allow_blank = true;
        self
    }

    pub fn stale_on_change(mut self) -> Self {
        self.stale_on_change = true;
        self
    }
}

impl From<&str> for DependencyKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for DependencyKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

// ============================================================================
// RESOURCE POLICY
// ============================================================================

/// Static, validated configuration the view and dependency evaluator read.
///
/// Everything here is plain data. The fetch capability lives with the
/// runtime that drives the resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePolicy {
    /// Namespaces every log line and observable key of the resource
    pub name: String,
    /// Present data older than this is stale (still shown, refetch wanted)
    pub stale_after: Interval,
    /// A transient failure becomes retryable after this delay
    pub retry_after: Interval,
    /// Present data older than this is discarded from the view entirely
    pub expire_after: Interval,
    pub dependencies: Vec<DependencyKey>,
}

impl ResourcePolicy {
    /// Create a policy with no staleness, retry, expiry or dependencies.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stale_after: Interval::Never,
            retry_after: Interval::Never,
            expire_after: Interval::Never,
            dependencies: Vec::new(),
        }
    }

    pub fn with_stale_after(mut self, interval: impl Into<Interval>) -> Self {
        self.stale_after = interval.into();
        self
    }

    pub fn with_retry_after(mut self, interval: impl Into<Interval>) -> Self {
        self.retry_after = interval.into();
        self
    }

    pub fn with_expire_after(mut self, interval: impl Into<Interval>) -> Self {
        self.expire_after = interval.into();
        self
    }

    pub fn with_dependency(mut self, dependency: impl Into<DependencyKey>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn with_dependencies<I, D>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<DependencyKey>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Look up a configured dependency by key.
    pub fn dependency(&self, key: &str) -> Option<&DependencyKey> {
        self.dependencies.iter().find(|dep| dep.key == key)
    }

    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }

    /// Validate the policy.
    ///
    /// Validates:
    /// - name is not blank
    /// - every configured interval is positive
    /// - dependency keys are non-empty and unique
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::missing("name"));
        }

        for (field, interval) in [
            ("stale_after", self.stale_after),
            ("retry_after", self.retry_after),
            ("expire_after", self.expire_after),
        ] {
            if interval == Interval::After(Duration::ZERO) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{:?}", Duration::ZERO),
                    reason: format!("{} must be positive (omit it for never)", field),
                });
            }
        }

        let mut seen = HashSet::new();
        for dep in &self.dependencies {
            if dep.key.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "dependencies".to_string(),
                    value: format!("{:?}", dep.key),
                    reason: "dependency key must not be empty".to_string(),
                });
            }
            if !seen.insert(dep.key.as_str()) {
                return Err(ConfigError::DuplicateDependency {
                    key: dep.key.clone(),
                });
            }
        }

        Ok(())
    }
}

// ============================================================================
// SETTINGS FILES
// ============================================================================

/// A dependency entry in a settings file: a bare key or a full table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySetting {
    Key(String),
    Table(DependencyKey),
}

impl From<DependencySetting> for DependencyKey {
    fn from(setting: DependencySetting) -> Self {
        match setting {
            DependencySetting::Key(key) => DependencyKey::new(key),
            DependencySetting::Table(key) => key,
        }
    }
}

/// TOML form of a [`ResourcePolicy`].
///
/// ```toml
/// name = "testResource"
/// stale_after_ms = 15000
/// dependencies = ["currentPage", { key = "pageSize", stale_on_change = true }]
/// ```
///
/// Durations are milliseconds; an omitted duration means never.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSettings {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stale_after_ms: Option<u64>,
    #[serde(default)]
    pub retry_after_ms: Option<u64>,
    #[serde(default)]
    pub expire_after_ms: Option<u64>,
    #[serde(default)]
    pub dependencies: Vec<DependencySetting>,
}

impl ResourceSettings {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Convert into a validated policy.
    pub fn into_policy(self) -> Result<ResourcePolicy, ConfigError> {
        let policy = ResourcePolicy::new(self.name)
            .with_stale_after(Interval::from_millis_opt(self.stale_after_ms))
            .with_retry_after(Interval::from_millis_opt(self.retry_after_ms))
            .with_expire_after(Interval::from_millis_opt(self.expire_after_ms))
            .with_dependencies(self.dependencies);
        policy.validate()?;
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_policy_defaults_to_never() {
        let policy = ResourcePolicy::new("testResource");
        assert!(policy.stale_after.is_never());
        assert!(policy.retry_after.is_never());
        assert!(policy.expire_after.is_never());
        assert!(!policy.has_dependencies());
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_requires_name() {
        let err = ResourcePolicy::new("  ").validate().unwrap_err();
        assert_eq!(err, ConfigError::missing("name"));
    }

    #[test]
    fn test_policy_rejects_zero_interval() {
        let err = ResourcePolicy::new("r")
            .with_retry_after(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert_eq!(err.field(), Some("retry_after"));
    }

    #[test]
    fn test_policy_rejects_duplicate_dependency() {
        let err = ResourcePolicy::new("r")
            .with_dependencies(["currentPage", "currentPage"])
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateDependency { key } if key == "currentPage"));
    }

    #[test]
    fn test_policy_rejects_empty_dependency_key() {
        let err = ResourcePolicy::new("r")
            .with_dependency("")
            .validate()
            .unwrap_err();
        assert_eq!(err.field(), Some("dependencies"));
    }

    #[test]
    fn test_dependency_key_builder() {
        let dep = DependencyKey::new("pageSize").allow_blank().stale_on_change();
        assert!(dep.allow_blank);
        assert!(dep.stale_on_change);
        assert_eq!(DependencyKey::from("pageSize").key, "pageSize");
    }

    #[test]
    fn test_settings_mixed_dependency_forms() {
        let settings = ResourceSettings::from_toml_str(
            r#"
            name = "testResource"
            stale_after_ms = 15000
            retry_after_ms = 10000
            dependencies = [
                "currentPage",
                { key = "pageSize", stale_on_change = true },
            ]
            "#,
        )
        .unwrap();

        let policy = settings.into_policy().unwrap();
        assert_eq!(policy.name, "testResource");
        assert_eq!(policy.stale_after, Interval::from_secs(15));
        assert_eq!(policy.retry_after, Interval::from_secs(10));
        assert!(policy.expire_after.is_never());
        assert_eq!(policy.dependencies[0], DependencyKey::new("currentPage"));
        assert_eq!(
            policy.dependencies[1],
            DependencyKey::new("pageSize").stale_on_change()
        );
    }

    #[test]
    fn test_settings_missing_name_reports_field() {
        let settings = ResourceSettings::from_toml_str("stale_after_ms = 10").unwrap();
        assert_eq!(settings.into_policy().unwrap_err(), ConfigError::missing("name"));
    }

    #[test]
    fn test_settings_reject_unknown_fields() {
        let err = ResourceSettings::from_toml_str("name = \"r\"\nttl = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_settings_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"fromFile\"\nexpire_after_ms = 20000").unwrap();

        let policy = ResourceSettings::from_path(file.path())
            .unwrap()
            .into_policy()
            .unwrap();
        assert_eq!(policy.name, "fromFile");
        assert_eq!(policy.expire_after, Interval::from_secs(20));
    }

    #[test]
    fn test_settings_missing_file_is_io_error() {
        let err = ResourceSettings::from_path(Path::new("/nonexistent/freshet.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
