//! A pooler rebuilt on top of a reopened sled database recovers the same
//! table, index and lock sequence it had before the restart.

use std::sync::Arc;

use pooler::Effect;
use pooler::PoolMetrics;
use pooler::Pooler;
use pooler::PoolerConfig;
use pooler::Policy;
use pooler::SledBackend;
use pooler::StorageConfig;
use pooler::TransactionalStore;
use prometheus::Registry;
use tempfile::TempDir;

use crate::common::policy;
use crate::common::POLICIES;

type SledPooler = Pooler<Policy, TransactionalStore<SledBackend>>;

fn open_pooler(dir: &TempDir) -> SledPooler {
    let storage = StorageConfig {
        db_path: dir.path().to_path_buf(),
        ..StorageConfig::default()
    };
    let backend = SledBackend::open(&storage).expect("open sled");
    let metrics = PoolMetrics::new(&Registry::new()).expect("metrics");
    Pooler::new(
        POLICIES,
        Arc::new(TransactionalStore::new(backend)),
        &PoolerConfig::default(),
        metrics,
    )
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");

    {
        let pooler = open_pooler(&dir);
        pooler.create("readers", policy("read")).await.unwrap();
        pooler.create("writers", policy("write")).await.unwrap();
        pooler.create("admins", policy("admin")).await.unwrap();
        pooler.update("readers", policy("list")).await.unwrap();
        pooler.delete("writers").await.unwrap();
        assert_eq!(pooler.index(), 6);
    }

    let pooler = open_pooler(&dir);
    assert_eq!(pooler.index(), 1);
    assert_eq!(pooler.refresh().await.unwrap(), 5);
    assert_eq!(pooler.index(), 6);

    let (readers, sequence) = pooler.item("readers").expect("readers survives");
    assert_eq!(sequence, 4);
    assert_eq!(readers.evaluate("list", "anything"), Some(Effect::Allow));
    assert!(pooler.item("writers").is_none());
    assert_eq!(pooler.item("admins").map(|(_, s)| s), Some(3));

    let names: Vec<String> = pooler.get().into_iter().map(|item| item.name).collect();
    assert_eq!(names, vec!["admins".to_string(), "readers".to_string()]);
}

#[tokio::test]
async fn test_lock_sequence_continues_after_restart() {
    let dir = tempfile::tempdir().expect("tempdir");

    {
        let pooler = open_pooler(&dir);
        pooler.create("readers", policy("read")).await.unwrap();
        pooler.create("writers", policy("write")).await.unwrap();
    }

    // No explicit refresh: the mutation catches up under the lock first
    let pooler = open_pooler(&dir);
    let (_, sequence) = pooler.create("auditors", policy("audit")).await.unwrap();
    assert_eq!(sequence, 3);
    assert_eq!(pooler.index(), 4);
    assert!(pooler.create("readers", policy("read")).await.unwrap_err().is_already_exists());
}
