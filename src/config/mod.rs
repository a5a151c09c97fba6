//! Configuration management for the pooler.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`POOLER__` prefix)
//! - Section-wise validation
mod retry;
mod storage;
mod stream;
mod transaction;
pub use retry::*;
pub use storage::*;
pub use stream::*;
pub use transaction::*;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for the pooler components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct PoolerConfig {
    /// Document store backend selection
    #[serde(default)]
    pub storage: StorageConfig,
    /// Transaction runner parameters
    #[serde(default)]
    pub transaction: TransactionConfig,
    /// Offset window retention
    #[serde(default)]
    pub window: WindowConfig,
    /// Catch-up streaming protocol
    #[serde(default)]
    pub stream: StreamConfig,
    /// Background refresher
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Retry policies for contended mutations
    #[serde(default)]
    pub retry: RetryPolicies,
}

impl Debug for PoolerConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PoolerConfig")
            .field("storage", &self.storage)
            .field("window", &self.window)
            .finish()
    }
}

impl PoolerConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `POOLER__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so that `with_override_config()` can still be
    /// applied. Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("POOLER__WINDOW__MAX_SIZE", "2048");
    /// let cfg = PoolerConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("POOLER")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

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
            .add_source(
                Environment::with_prefix("POOLER")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.storage.validate()?;
        self.transaction.validate()?;
        self.window.validate()?;
        self.stream.validate(&self.window)?;
        self.refresh.validate()?;
        self.retry.validate()?;
        Ok(self)
    }
}
