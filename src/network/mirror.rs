//! Subscriber-side replica fed by the catch-up stream.

use std::collections::HashMap;
use std::time::Duration;

use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tonic::Code;
use tonic::Status;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::proto::PoolChangesRequest;
use crate::proto::PoolChangesResponse;
use crate::OffsetItem;
use crate::Poolable;
use crate::Result;

/// How a followed stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    /// The server closed the stream; resume from [`PoolMirror::watermark`]
    Ended,
    /// The watermark was evicted; reload a snapshot before resuming
    Resync,
}

/// Local copy of a remote pool, tracking the last applied sequence.
#[derive(Debug, Clone)]
pub struct PoolMirror<T> {
    items: HashMap<String, (T, u32)>,
    watermark: u32,
}

impl<T: Poolable> Default for PoolMirror<T> {
    fn default() -> Self {
        Self {
            items: HashMap::new(),
            watermark: 0,
        }
    }
}

impl<T: Poolable> PoolMirror<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(
        items: Vec<OffsetItem<T>>,
        watermark: u32,
    ) -> Self {
        let mut mirror = Self::new();
        mirror.resync(items, watermark);
        mirror
    }

    /// Replaces the whole replica with a snapshot consistent with `watermark`
    pub fn resync(
        &mut self,
        items: Vec<OffsetItem<T>>,
        watermark: u32,
    ) {
        info!(watermark, items = items.len(), "mirror resynchronised from snapshot");
        self.items = items
            .into_iter()
            .filter(|item| !item.is_delete())
            .map(|item| (item.name, (item.payload, item.sequence)))
            .collect();
        self.watermark = watermark;
    }

    /// Last sequence applied
    pub fn watermark(&self) -> u32 {
        self.watermark
    }

    pub fn item(
        &self,
        name: &str,
    ) -> Option<(&T, u32)> {
        self.items.get(name).map(|(value, sequence)| (value, *sequence))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Subscription resuming right after the watermark
    pub fn request(
        &self,
        idle_timeout: Duration,
    ) -> PoolChangesRequest {
        PoolChangesRequest {
            start_sequence: self.watermark,
            idle_timeout_ms: u64::try_from(idle_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Applies one streamed batch and returns how many changes were new.
    ///
    /// Changes at or below the watermark are duplicates of a previous
    /// subscription and are skipped.
    pub fn apply(
        &mut self,
        response: &PoolChangesResponse,
    ) -> Result<usize> {
        let mut applied = 0;
        for change in &response.changes {
            if change.sequence <= self.watermark {
                debug!(sequence = change.sequence, "skipping already applied change");
                continue;
            }
            if change.sequence != self.watermark + 1 {
                warn!(
                    watermark = self.watermark,
                    sequence = change.sequence,
                    "change stream skipped sequences"
                );
            }

            if change.deleted {
                self.items.remove(&change.name);
            } else {
                let value: T = bincode::deserialize(&change.value)?;
                self.items.insert(change.name.clone(), (value, change.sequence));
            }
            self.watermark = change.sequence;
            applied += 1;
        }
        Ok(applied)
    }

    /// Consumes `stream` until it ends or fails.
    ///
    /// An `OUT_OF_RANGE` status is reported as [`FollowOutcome::Resync`];
    /// any other status is returned as an error.
    pub async fn follow<St>(
        &mut self,
        mut stream: St,
    ) -> std::result::Result<FollowOutcome, Status>
    where
        St: Stream<Item = std::result::Result<PoolChangesResponse, Status>> + Unpin,
    {
        while let Some(message) = stream.next().await {
            match message {
                Ok(response) => {
                    self.apply(&response).map_err(Status::from)?;
                }
                Err(status) if status.code() == Code::OutOfRange => {
                    info!(watermark = self.watermark, "stream out of range, resync required");
                    return Ok(FollowOutcome::Resync);
                }
                Err(status) => return Err(status),
            }
        }
        Ok(FollowOutcome::Ended)
    }
}
