use std::time::Duration;

use tonic::Status;

use super::*;
use crate::proto::PoolChange;
use crate::proto::PoolChangesResponse;
use crate::test_utils::Spec;
use crate::Action;
use crate::OffsetItem;

fn change(
    name: &str,
    sequence: u32,
    body: &str,
    deleted: bool,
) -> PoolChange {
    PoolChange {
        name: name.to_string(),
        sequence,
        value: bincode::serialize(&Spec::new(body)).unwrap(),
        deleted,
    }
}

fn batch(changes: Vec<PoolChange>) -> PoolChangesResponse {
    PoolChangesResponse { changes }
}

#[test]
fn test_apply_tracks_watermark_and_deletes() {
    let mut mirror: PoolMirror<Spec> = PoolMirror::new();

    let applied = mirror
        .apply(&batch(vec![change("p1", 1, "x", false), change("p2", 2, "y", false)]))
        .unwrap();
    assert_eq!(applied, 2);
    assert_eq!(mirror.watermark(), 2);
    assert_eq!(mirror.item("p1"), Some((&Spec::new("x"), 1)));

    mirror.apply(&batch(vec![change("p1", 3, "x", true)])).unwrap();
    assert!(mirror.item("p1").is_none());
    assert_eq!(mirror.len(), 1);
    assert_eq!(mirror.watermark(), 3);
}

#[test]
fn test_duplicates_after_reconnect_are_skipped() {
    let mut mirror: PoolMirror<Spec> = PoolMirror::new();
    mirror
        .apply(&batch(vec![change("p1", 1, "x", false), change("p1", 2, "y", false)]))
        .unwrap();

    let applied = mirror
        .apply(&batch(vec![change("p1", 2, "stale", false), change("p1", 3, "z", false)]))
        .unwrap();
    assert_eq!(applied, 1);
    assert_eq!(mirror.item("p1"), Some((&Spec::new("z"), 3)));
}

#[test]
fn test_heartbeat_changes_nothing() {
    let mut mirror: PoolMirror<Spec> = PoolMirror::new();
    assert_eq!(mirror.apply(&PoolChangesResponse::heartbeat()).unwrap(), 0);
    assert_eq!(mirror.watermark(), 0);
    assert!(mirror.is_empty());
}

#[test]
fn test_request_resumes_after_watermark() {
    let mut mirror: PoolMirror<Spec> = PoolMirror::new();
    mirror.apply(&batch(vec![change("p1", 1, "x", false)])).unwrap();

    let request = mirror.request(Duration::from_secs(5));
    assert_eq!(request.start_sequence, 1);
    assert_eq!(request.idle_timeout_ms, 5_000);
}

#[test]
fn test_request_saturates_oversized_idle_timeout() {
    let mirror: PoolMirror<Spec> = PoolMirror::new();
    let request = mirror.request(Duration::MAX);
    assert_eq!(request.start_sequence, 0);
    assert_eq!(request.idle_timeout_ms, u64::MAX);
}

#[test]
fn test_resync_replaces_replica() {
    let mut mirror: PoolMirror<Spec> = PoolMirror::new();
    mirror.apply(&batch(vec![change("old", 1, "x", false)])).unwrap();

    let snapshot = vec![OffsetItem {
        payload: Spec::new("fresh"),
        name: "p9".to_string(),
        sequence: 40,
        action: Action::Update,
    }];
    mirror.resync(snapshot, 42);

    assert!(mirror.item("old").is_none());
    assert_eq!(mirror.item("p9"), Some((&Spec::new("fresh"), 40)));
    assert_eq!(mirror.watermark(), 42);
}

#[test]
fn test_undecodable_value_is_an_error() {
    let mut mirror: PoolMirror<Spec> = PoolMirror::new();
    let bad = PoolChange {
        name: "p1".into(),
        sequence: 1,
        value: vec![0xff],
        deleted: false,
    };
    assert!(mirror.apply(&batch(vec![bad])).is_err());
}

#[tokio::test]
async fn test_follow_reports_resync_on_out_of_range() {
    let mut mirror: PoolMirror<Spec> = PoolMirror::new();
    let messages = vec![
        Ok(batch(vec![change("p1", 1, "x", false)])),
        Err(Status::out_of_range("evicted")),
        Ok(batch(vec![change("p2", 2, "never applied", false)])),
    ];

    let outcome = mirror.follow(tokio_stream::iter(messages)).await.unwrap();
    assert_eq!(outcome, FollowOutcome::Resync);
    assert_eq!(mirror.watermark(), 1);
    assert!(mirror.item("p2").is_none());
}

#[tokio::test]
async fn test_follow_until_stream_ends() {
    let mut mirror: PoolMirror<Spec> = PoolMirror::new();
    let messages: Vec<Result<PoolChangesResponse, Status>> = vec![
        Ok(batch(vec![change("p1", 1, "x", false)])),
        Ok(PoolChangesResponse::heartbeat()),
    ];
    assert_eq!(
        mirror.follow(tokio_stream::iter(messages)).await.unwrap(),
        FollowOutcome::Ended
    );

    let failing: Vec<Result<PoolChangesResponse, Status>> = vec![Err(Status::internal("boom"))];
    assert!(mirror.follow(tokio_stream::iter(failing)).await.is_err());
}
