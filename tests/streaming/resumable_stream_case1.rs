//! Case 1: a subscriber resumes the change stream from its watermark
//!
//! Scenario:
//!
//! 1. A writer process creates five policies.
//! 2. A subscriber follows the change stream served by a second process and
//!    disconnects after consuming sequence 3.
//! 3. The writer creates two more policies; the subscriber reconnects with
//!    `start = 3`.
//! 4. The window shrinks past the subscriber's watermark on another service.
//!
//! Expected Result:
//!
//! - The reconnect delivers exactly sequences 4..=7, no duplicates, no gaps
//! - An evicted watermark ends the stream with OUT_OF_RANGE and the mirror
//!   resynchronises from a snapshot

use std::time::Duration;

use pooler::proto::PoolChangesRequest;
use pooler::FollowOutcome;
use pooler::Policy;
use pooler::PoolMirror;
use pooler::PoolRpc;
use pooler::PoolService;
use pooler::PoolerConfig;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tonic::Request;

use crate::common::policy;
use crate::common::TestContext;

fn fast_stream_config() -> PoolerConfig {
    let mut config = PoolerConfig::default();
    config.stream.tick_interval_ms = 10;
    config.stream.default_idle_timeout_ms = 50;
    config
}

#[tokio::test]
async fn test_reconnect_resumes_without_duplicates_or_gaps() {
    let config = fast_stream_config();
    let ctx = TestContext::with_config(2, config.clone());
    let writer = ctx.pooler(0);
    let server = ctx.pooler(1);
    let shutdown = CancellationToken::new();
    let service = PoolService::new(server.clone(), &config, shutdown.clone());

    for i in 1..=5 {
        writer.create(&format!("p{i}"), policy("read")).await.unwrap();
    }
    server.refresh().await.unwrap();

    // first subscription: consume up to sequence 3 and hang up
    let mut mirror: PoolMirror<Policy> = PoolMirror::new();
    let mut stream = service
        .pool_changes(Request::new(mirror.request(Duration::from_secs(60))))
        .await
        .unwrap()
        .into_inner();
    let batch = stream.next().await.unwrap().unwrap();
    let mut consumed = batch.clone();
    consumed.changes.retain(|change| change.sequence <= 3);
    mirror.apply(&consumed).unwrap();
    drop(stream);
    assert_eq!(mirror.watermark(), 3);

    for i in 6..=7 {
        writer.create(&format!("p{i}"), policy("read")).await.unwrap();
    }
    server.refresh().await.unwrap();

    // reconnect from the watermark
    let mut stream = service
        .pool_changes(Request::new(mirror.request(Duration::from_secs(60))))
        .await
        .unwrap()
        .into_inner();
    let batch = stream.next().await.unwrap().unwrap();
    let sequences: Vec<u32> = batch.changes.iter().map(|c| c.sequence).collect();
    assert_eq!(sequences, vec![4, 5, 6, 7]);

    assert_eq!(mirror.apply(&batch).unwrap(), 4);
    assert_eq!(mirror.watermark(), 7);
    assert_eq!(mirror.len(), 7);
    shutdown.cancel();
}

#[tokio::test]
async fn test_live_tail_and_heartbeat() {
    let config = fast_stream_config();
    let ctx = TestContext::with_config(1, config.clone());
    let pooler = ctx.pooler(0);
    let service = PoolService::new(pooler.clone(), &config, CancellationToken::new());

    let mut stream = service
        .pool_changes(Request::new(PoolChangesRequest {
            start_sequence: 0,
            idle_timeout_ms: 0,
        }))
        .await
        .unwrap()
        .into_inner();

    // nothing to replay: the first message is a heartbeat after the idle timeout
    let first = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(first.is_heartbeat());

    pooler.create("p1", policy("read")).await.unwrap();
    let mut live = stream.next().await.unwrap().unwrap();
    while live.is_heartbeat() {
        live = stream.next().await.unwrap().unwrap();
    }
    assert_eq!(live.last_sequence(), Some(1));
    assert_eq!(live.changes[0].name, "p1");
}

#[tokio::test]
async fn test_evicted_watermark_falls_back_to_snapshot() {
    let mut config = fast_stream_config();
    config.window.max_size = 4;
    config.stream.max_batch_size = 4;
    let ctx = TestContext::with_config(1, config.clone());
    let pooler = ctx.pooler(0);
    let service = PoolService::new(pooler.clone(), &config, CancellationToken::new());

    for i in 1..=10 {
        pooler.create(&format!("p{i}"), policy("read")).await.unwrap();
    }
    pooler.delete("p1").await.unwrap();

    let mut mirror: PoolMirror<Policy> = PoolMirror::new();
    let stream = service
        .pool_changes(Request::new(mirror.request(Duration::from_secs(60))))
        .await
        .unwrap()
        .into_inner();

    let outcome = mirror.follow(stream).await.unwrap();
    assert_eq!(outcome, FollowOutcome::Resync);

    let (snapshot, watermark) = pooler.snapshot();
    mirror.resync(snapshot, watermark);
    assert_eq!(mirror.watermark(), 11);
    assert_eq!(mirror.len(), 9);
    assert!(mirror.item("p1").is_none());

    // resuming from the snapshot watermark is within the window again
    let mut stream = service
        .pool_changes(Request::new(mirror.request(Duration::from_millis(50))))
        .await
        .unwrap()
        .into_inner();
    let next = stream.next().await.unwrap().unwrap();
    assert!(next.is_heartbeat());
}
