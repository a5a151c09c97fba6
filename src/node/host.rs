//! Process-level assembly of poolers.
//!
//! A [`PoolerHost`] opens the document store selected by `storage.backend`,
//! registers the metrics once and hands out poolers sharing both. Every pooler
//! it builds is loaded from the log before it is returned and, when
//! `refresh.interval_ms` is non-zero, tailed by a background refresher.
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let host = PoolerHost::from_env(&registry, shutdown_rx)?;
//! let policies = host.pooler::<Policy>("policies").await?;
//! let service = host.service(policies, CancellationToken::new());
//! // ...
//! shutdown_tx.send(())?;
//! host.join().await?;
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use prometheus::Registry;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::ConfiguredBackend;
use crate::PoolMetrics;
use crate::PoolService;
use crate::Poolable;
use crate::Pooler;
use crate::PoolerConfig;
use crate::Result;
use crate::TransactionalStore;

pub type HostStore = TransactionalStore<ConfiguredBackend>;

pub struct PoolerHost {
    config: PoolerConfig,
    store: Arc<HostStore>,
    metrics: PoolMetrics,
    shutdown: watch::Receiver<()>,
    refreshers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for PoolerHost {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PoolerHost")
            .field("backend", &self.store.backend().kind())
            .field("refreshers", &self.refreshers.lock().len())
            .finish()
    }
}

impl PoolerHost {
    /// Validates `config`, opens its backend and registers metrics into
    /// `registry`.
    pub fn open(
        config: PoolerConfig,
        registry: &Registry,
        shutdown: watch::Receiver<()>,
    ) -> Result<Self> {
        let config = config.validate()?;
        let backend = ConfiguredBackend::open(&config.storage)?;
        let metrics = PoolMetrics::new(registry)?;

        Ok(Self {
            config,
            store: Arc::new(TransactionalStore::new(backend)),
            metrics,
            shutdown,
            refreshers: Mutex::new(Vec::new()),
        })
    }

    /// Same as [`PoolerHost::open`] with configuration loaded from
    /// `CONFIG_PATH` and `POOLER__*` variables.
    pub fn from_env(
        registry: &Registry,
        shutdown: watch::Receiver<()>,
    ) -> Result<Self> {
        Self::open(PoolerConfig::new()?, registry, shutdown)
    }

    pub fn config(&self) -> &PoolerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<HostStore> {
        &self.store
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    /// Builds the pooler of `collection` and folds in the existing log.
    pub async fn pooler<T: Poolable>(
        &self,
        collection: &str,
    ) -> Result<Arc<Pooler<T, HostStore>>> {
        let pooler = Arc::new(Pooler::new(
            collection,
            self.store.clone(),
            &self.config,
            self.metrics.clone(),
        ));
        let applied = pooler.refresh().await?;
        info!(collection, applied, index = pooler.index(), "pooler loaded");

        if let Some(interval) = self.config.refresh.interval() {
            debug!(collection, ?interval, "starting background refresher");
            let handle = pooler.spawn_refresher(interval, self.shutdown.clone());
            self.refreshers.lock().push(handle);
        }
        Ok(pooler)
    }

    pub fn service<T: Poolable>(
        &self,
        pooler: Arc<Pooler<T, HostStore>>,
        shutdown: CancellationToken,
    ) -> PoolService<T, HostStore> {
        PoolService::new(pooler, &self.config, shutdown)
    }

    /// Waits for every refresher to stop once the shutdown signal fired
    pub async fn join(&self) -> Result<()> {
        let handles = std::mem::take(&mut *self.refreshers.lock());
        for handle in handles {
            handle.await?;
        }
        Ok(())
    }
}
