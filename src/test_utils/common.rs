use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use serde::Deserialize;
use serde::Serialize;
use tonic::async_trait;

use crate::DocumentWrite;
use crate::MemoryBackend;
use crate::PoolMetrics;
use crate::Poolable;
use crate::Pooler;
use crate::PoolerConfig;
use crate::StorageBackend;
use crate::StoredDocument;
use crate::TransactionalStore;
use crate::ValidationError;

pub const TEST_COLLECTION: &str = "specs";

pub type MemStore = TransactionalStore<MemoryBackend>;

/// Minimal poolable value: trimmed on clean, rejected when blank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    pub body: String,
}

impl Spec {
    pub fn new(body: &str) -> Self {
        Self { body: body.to_string() }
    }
}

impl Poolable for Spec {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.body.trim().is_empty() {
            return Err(ValidationError::new("body must not be blank"));
        }
        Ok(())
    }

    fn clean(&mut self) {
        self.body = self.body.trim().to_string();
    }
}

pub fn mem_store() -> Arc<MemStore> {
    Arc::new(TransactionalStore::new(MemoryBackend::new()))
}

/// Store handles of `n` processes sharing one database
pub fn shared_stores(n: usize) -> Vec<Arc<MemStore>> {
    let backend = Arc::new(MemoryBackend::new());
    (0..n)
        .map(|_| Arc::new(TransactionalStore::with_backend(backend.clone())))
        .collect()
}

pub fn test_metrics() -> PoolMetrics {
    PoolMetrics::new(&Registry::new()).unwrap()
}

pub fn test_pooler(store: Arc<MemStore>) -> Pooler<Spec, MemStore> {
    test_pooler_with(store, PoolerConfig::default())
}

pub fn test_pooler_with(
    store: Arc<MemStore>,
    config: PoolerConfig,
) -> Pooler<Spec, MemStore> {
    Pooler::new(TEST_COLLECTION, store, &config, test_metrics())
}

/// Memory backend whose `apply` sleeps first, so commits can be caught
/// in flight
#[derive(Debug, Default)]
pub struct SlowBackend {
    inner: MemoryBackend,
    delay_ms: AtomicU64,
}

impl SlowBackend {
    pub fn new(delay: Duration) -> Self {
        let backend = Self::default();
        backend.set_delay(delay);
        backend
    }

    pub fn set_delay(
        &self,
        delay: Duration,
    ) {
        self.delay_ms.store(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageBackend for SlowBackend {
    fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> crate::Result<Option<StoredDocument>> {
        self.inner.get(collection, key)
    }

    fn scan(
        &self,
        collection: &str,
        start_key: &str,
    ) -> crate::Result<Vec<StoredDocument>> {
        self.inner.scan(collection, start_key)
    }

    fn next_revision(&self) -> crate::Result<u64> {
        self.inner.next_revision()
    }

    async fn apply(
        &self,
        writes: Vec<DocumentWrite>,
        wait_for_sync: bool,
    ) -> crate::Result<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.apply(writes, wait_for_sync).await
    }
}
