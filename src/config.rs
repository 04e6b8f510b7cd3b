//! Configuration for the reactive engine.
//!
//! This module provides the base [`Config`] trait and [`EngineConfig`], the
//! settings a [`Context`](crate::Context) is built from.

/// Base trait for configuration types.
///
/// # Example
///
/// ```rust
/// use rivulet::Config;
///
/// #[derive(Debug, Clone)]
/// struct PipelineConfig {
///     name: String,
///     max_inners: usize,
/// }
///
/// impl Config for PipelineConfig {
///     fn name(&self) -> &str {
///         &self.name
///     }
///
///     fn validate(&self) -> Result<(), String> {
///         if self.max_inners == 0 {
///             return Err("max_inners must be greater than 0".to_string());
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Config {
    /// Returns the configuration name/identifier.
    fn name(&self) -> &str {
        "default"
    }

    /// Returns whether verbose output is enabled.
    fn is_verbose(&self) -> bool {
        false
    }

    /// Validates the configuration.
    ///
    /// Returns Ok(()) if valid, or an error message describing the issue.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// What happens to an error that reaches a subscriber without an error handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnhandledErrorPolicy {
    /// Log the error through `tracing` at error level
    #[default]
    Log,
    /// Panic with the error message
    Panic,
    /// Drop the error silently
    Ignore,
}

/// Settings shared by every subscription made under one context.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Name used in log records
    pub name: String,
    /// Log every notification at trace level
    pub verbose: bool,
    /// Concurrency used by `merge_map` when the operator was given none
    pub default_concurrency: Option<usize>,
    /// Handling of errors nobody subscribed to
    pub unhandled_errors: UnhandledErrorPolicy,
}

impl EngineConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the default merge concurrency.
    pub fn with_default_concurrency(mut self, limit: usize) -> Self {
        self.default_concurrency = Some(limit);
        self
    }

    /// Set the unhandled error policy.
    pub fn with_unhandled_errors(mut self, policy: UnhandledErrorPolicy) -> Self {
        self.unhandled_errors = policy;
        self
    }

    /// Enable verbose notification logging.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }
}

impl Config for EngineConfig {
    fn name(&self) -> &str {
        if self.name.is_empty() {
            "default"
        } else {
            &self.name
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn validate(&self) -> Result<(), String> {
        if self.default_concurrency == Some(0) {
            return Err("default_concurrency must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::new()
            .with_name("ui")
            .with_default_concurrency(4)
            .verbose();

        assert_eq!(config.name(), "ui");
        assert_eq!(config.default_concurrency, Some(4));
        assert!(config.is_verbose());
        assert_eq!(config.unhandled_errors, UnhandledErrorPolicy::Log);
    }

    #[test]
    fn test_unnamed_config() {
        assert_eq!(EngineConfig::new().name(), "default");
    }

    #[test]
    fn test_config_validation() {
        assert!(EngineConfig::new().validate().is_ok());
        assert!(EngineConfig::new()
            .with_default_concurrency(0)
            .validate()
            .is_err());
    }
}
