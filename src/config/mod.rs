//! Configuration management for the push fan-out engine.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Environment variable overrides
//! - Configuration file support
//! - Component-wise validation
mod fuzzy_watch;
mod push;
mod request;
pub use fuzzy_watch::*;
pub use push::*;
pub use request::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for the notification subsystems
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct EngineConfig {
    /// Service push debounce and retry parameters
    #[serde(default)]
    pub push: PushConfig,
    /// Wildcard watch sync parameters
    #[serde(default)]
    pub fuzzy_watch: FuzzyWatchConfig,
    /// Request/response correlation parameters
    #[serde(default)]
    pub request: RequestConfig,
}

impl Debug for EngineConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("push", &self.push)
            .field("fuzzy_watch", &self.fuzzy_watch)
            .field("request", &self.request)
            .finish()
    }
}

impl EngineConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `FANOUT__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so that `with_override_config()` can still be
    /// applied. Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("FANOUT__PUSH__PUSH_TASK_DELAY_MS", "200");
    /// let cfg = EngineConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every subsystem and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.push.validate()?;
        self.fuzzy_watch.validate()?;
        self.request.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("FANOUT")
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
