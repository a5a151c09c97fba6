use std::sync::Arc;

use pooler::MemoryBackend;
use pooler::PoolMetrics;
use pooler::Pooler;
use pooler::PoolerConfig;
use pooler::Policy;
use pooler::Rule;
use pooler::TransactionalStore;
use prometheus::Registry;

pub const POLICIES: &str = "policies";

pub type MemStore = TransactionalStore<MemoryBackend>;
pub type PolicyPooler = Pooler<Policy, MemStore>;

/// One pooler per simulated process, all sharing one database
pub struct TestContext {
    pub backend: Arc<MemoryBackend>,
    pub poolers: Vec<Arc<PolicyPooler>>,
    pub registry: Registry,
}

impl TestContext {
    pub fn new(processes: usize) -> Self {
        Self::with_config(processes, PoolerConfig::default())
    }

    pub fn with_config(
        processes: usize,
        config: PoolerConfig,
    ) -> Self {
        let config = config.validate().expect("valid test config");
        let backend = Arc::new(MemoryBackend::new());
        let registry = Registry::new();
        let metrics = PoolMetrics::new(&registry).expect("metrics registered once");

        let poolers = (0..processes)
            .map(|_| {
                let store = Arc::new(TransactionalStore::with_backend(backend.clone()));
                Arc::new(Pooler::new(POLICIES, store, &config, metrics.clone()))
            })
            .collect();

        Self {
            backend,
            poolers,
            registry,
        }
    }

    pub fn pooler(
        &self,
        i: usize,
    ) -> Arc<PolicyPooler> {
        self.poolers[i].clone()
    }
}

pub fn policy(action: &str) -> Policy {
    Policy::new(vec![Rule::allow(&[action], &["*"])])
}
