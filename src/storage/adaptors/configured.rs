use tonic::async_trait;
use tracing::info;

use super::MemoryBackend;
use super::SledBackend;
use crate::BackendKind;
use crate::DocumentWrite;
use crate::Result;
use crate::StorageBackend;
use crate::StorageConfig;
use crate::StoredDocument;

/// Backend picked by `storage.backend`
#[derive(Debug)]
pub enum ConfiguredBackend {
    Memory(MemoryBackend),
    Sled(SledBackend),
}

impl ConfiguredBackend {
    pub fn open(config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        match config.backend {
            BackendKind::Memory => {
                info!("using in-memory document store");
                Ok(Self::Memory(MemoryBackend::new()))
            }
            BackendKind::Sled => {
                info!(db_path = ?config.db_path, "using sled document store");
                Ok(Self::Sled(SledBackend::open(config)?))
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Memory(_) => BackendKind::Memory,
            Self::Sled(_) => BackendKind::Sled,
        }
    }
}

#[async_trait]
impl StorageBackend for ConfiguredBackend {
    fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<StoredDocument>> {
        match self {
            Self::Memory(b) => b.get(collection, key),
            Self::Sled(b) => b.get(collection, key),
        }
    }

    fn scan(
        &self,
        collection: &str,
        start_key: &str,
    ) -> Result<Vec<StoredDocument>> {
        match self {
            Self::Memory(b) => b.scan(collection, start_key),
            Self::Sled(b) => b.scan(collection, start_key),
        }
    }

    fn next_revision(&self) -> Result<u64> {
        match self {
            Self::Memory(b) => b.next_revision(),
            Self::Sled(b) => b.next_revision(),
        }
    }

    async fn apply(
        &self,
        writes: Vec<DocumentWrite>,
        wait_for_sync: bool,
    ) -> Result<()> {
        match self {
            Self::Memory(b) => b.apply(writes, wait_for_sync).await,
            Self::Sled(b) => b.apply(writes, wait_for_sync).await,
        }
    }
}
