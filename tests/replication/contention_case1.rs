//! Case 1: concurrent writers serialize through the lock document
//!
//! Scenario:
//!
//! 1. Four processes share one document store.
//! 2. All of them create the same name at the same time, retrying on
//!    contention.
//! 3. Afterwards each creates a distinct name concurrently.
//!
//! Expected Result:
//!
//! - Exactly one create of the shared name succeeds, the others observe
//!   `AlreadyExists`
//! - Sequences stay gap-free and every process converges

use std::collections::HashSet;

use futures::future::join_all;
use pooler::async_task::retry_on_contention;
use pooler::BackoffPolicy;

use crate::common::policy;
use crate::common::TestContext;

fn patient() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 100,
        timeout_ms: 10_000,
        base_delay_ms: 1,
        max_delay_ms: 20,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_winner_for_same_name() {
    let ctx = TestContext::new(4);

    let attempts = ctx.poolers.iter().cloned().map(|pooler| {
        tokio::spawn(async move {
            retry_on_contention(&patient(), || pooler.create("shared", policy("read"))).await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(err.is_already_exists(), "unexpected error: {err:?}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_names_get_gap_free_sequences() {
    let ctx = TestContext::new(4);

    let writes = ctx.poolers.iter().cloned().enumerate().flat_map(|(p, pooler)| {
        (0..5).map(move |i| {
            let pooler = pooler.clone();
            tokio::spawn(async move {
                let name = format!("p{p}-{i}");
                retry_on_contention(&patient(), || pooler.create(&name, policy("read"))).await
            })
        })
    });
    let sequences: HashSet<u32> = join_all(writes)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().1)
        .collect();

    assert_eq!(sequences, (1..=20).collect::<HashSet<u32>>());

    for pooler in &ctx.poolers {
        pooler.refresh().await.unwrap();
        assert_eq!(pooler.index(), 21);
        assert_eq!(pooler.get().len(), 20);
    }
    assert_eq!(ctx.pooler(0).get(), ctx.pooler(3).get());
}
