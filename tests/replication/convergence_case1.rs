//! Case 1: processes sharing one store converge through refresh
//!
//! Scenario:
//!
//! 1. Three processes share one document store.
//! 2. Process 0 creates "p1", process 1 updates it, process 2 deletes it.
//! 3. Every process refreshes.
//!
//! Expected Result:
//!
//! - Sequences 1, 2, 3 are handed out in order across processes
//! - Every process ends with the same index, snapshot and window
//! - `Pool(0)` spans sequences 1-3 including the delete entry

use pooler::Action;
use pooler::Poolable;

use crate::common::policy;
use crate::common::TestContext;

#[tokio::test]
async fn test_create_update_delete_across_processes() {
    let ctx = TestContext::new(3);

    let (_, seq) = ctx.pooler(0).create("p1", policy("read")).await.unwrap();
    assert_eq!(seq, 1);

    // process 1 has never refreshed; its mutation folds in sequence 1 first
    let (_, seq) = ctx.pooler(1).update("p1", policy("write")).await.unwrap();
    assert_eq!(seq, 2);

    let snapshot = ctx.pooler(1).get();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].name, "p1");
    assert_eq!(snapshot[0].sequence, 2);

    let (_, seq) = ctx.pooler(2).delete("p1").await.unwrap();
    assert_eq!(seq, 3);

    for pooler in &ctx.poolers {
        pooler.refresh().await.unwrap();
        assert_eq!(pooler.index(), 4);
        assert!(pooler.item("p1").is_none());

        let window = pooler.pool(0).unwrap();
        let sequences: Vec<u32> = window.iter().map(|item| item.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(window[2].action, Action::Delete);
    }
}

#[tokio::test]
async fn test_stale_process_observes_foreign_writes_only_after_refresh() {
    let ctx = TestContext::new(2);
    let writer = ctx.pooler(0);
    let reader = ctx.pooler(1);

    for i in 0..10 {
        writer.create(&format!("p{i}"), policy("read")).await.unwrap();
    }
    assert!(reader.get().is_empty());
    assert_eq!(reader.index(), 1);

    assert_eq!(reader.refresh().await.unwrap(), 10);
    assert_eq!(reader.get(), writer.get());
    assert_eq!(reader.index(), writer.index());

    // refreshing again is a no-op
    assert_eq!(reader.refresh().await.unwrap(), 0);
    assert_eq!(reader.pool(0).unwrap(), writer.pool(0).unwrap());
}

#[tokio::test]
async fn test_stored_values_are_cleaned() {
    let ctx = TestContext::new(2);
    let mut messy = policy("READ");
    messy.description = "  readers ".into();

    let (stored, _) = ctx.pooler(0).create("p1", messy.clone()).await.unwrap();
    messy.clean();
    assert_eq!(stored, messy);

    ctx.pooler(1).refresh().await.unwrap();
    assert_eq!(ctx.pooler(1).item("p1"), Some((messy, 1)));

    let text = pooler::gather_text(&ctx.registry);
    assert!(text.contains("pooler_mutations_total{action=\"create\",collection=\"policies\"} 1"));
}
