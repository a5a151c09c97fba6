use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Parameters applied to every transaction opened by the runner
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransactionConfig {
    /// Upper bound on waiting for the store's commit gate (milliseconds)
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Budget for the rollback path, independent of the caller (milliseconds)
    #[serde(default = "default_abort_timeout_ms")]
    pub abort_timeout_ms: u64,

    /// Flush to disk before a commit is acknowledged
    #[serde(default = "default_wait_for_sync")]
    pub wait_for_sync: bool,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            abort_timeout_ms: default_abort_timeout_ms(),
            wait_for_sync: default_wait_for_sync(),
        }
    }
}

impl TransactionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "transaction.lock_timeout_ms must be greater than 0".into(),
            )));
        }
        if self.abort_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "transaction.abort_timeout_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn abort_timeout(&self) -> Duration {
        Duration::from_millis(self.abort_timeout_ms)
    }
}

fn default_lock_timeout_ms() -> u64 {
    10_000
}
fn default_abort_timeout_ms() -> u64 {
    10_000
}
fn default_wait_for_sync() -> bool {
    true
}
