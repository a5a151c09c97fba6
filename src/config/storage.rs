use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Database directory, required by the sled backend
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_cache_capacity_bytes")]
    pub cache_capacity_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            db_path: default_db_path(),
            cache_capacity_bytes: default_cache_capacity_bytes(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend == BackendKind::Sled && self.db_path.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "storage.db_path is required by the sled backend".into(),
            )));
        }
        if self.cache_capacity_bytes == 0 {
            return Err(Error::Config(ConfigError::Message(
                "storage.cache_capacity_bytes must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./db/pooler")
}
fn default_cache_capacity_bytes() -> u64 {
    64 * 1024 * 1024 //64MB
}
