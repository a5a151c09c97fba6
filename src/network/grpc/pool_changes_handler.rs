//! Push loop of the catch-up stream.
//!
//! ```text
//! Pooler (offset window) → PoolChangesHandler (tick) → mpsc → gRPC stream
//! ```
//!
//! On every tick the handler asks the pooler for retained changes after the
//! subscriber's watermark and forwards them in bounded batches. A quiet
//! stream gets an empty heartbeat once the idle timeout has elapsed since the
//! last message. An evicted watermark ends the stream with `OUT_OF_RANGE`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::proto::PoolChange;
use crate::proto::PoolChangesRequest;
use crate::proto::PoolChangesResponse;
use crate::DocumentStore;
use crate::IdleTimer;
use crate::OffsetItem;
use crate::Poolable;
use crate::Pooler;
use crate::Result;
use crate::StreamConfig;

pub type PoolChangesSender = mpsc::Sender<std::result::Result<PoolChangesResponse, Status>>;

pub struct PoolChangesHandler<T: Poolable, S: DocumentStore> {
    pooler: Arc<Pooler<T, S>>,
    /// Last sequence delivered to the subscriber
    current_index: u32,
    idle_timeout: Duration,
    tick_interval: Duration,
    max_batch_size: usize,
}

impl<T: Poolable, S: DocumentStore> PoolChangesHandler<T, S> {
    pub fn new(
        pooler: Arc<Pooler<T, S>>,
        request: &PoolChangesRequest,
        config: &StreamConfig,
    ) -> Self {
        let idle_timeout = match request.idle_timeout_ms {
            0 => config.default_idle_timeout(),
            ms => Duration::from_millis(ms),
        };
        Self {
            pooler,
            current_index: request.start_sequence,
            idle_timeout,
            tick_interval: config.tick_interval(),
            max_batch_size: config.max_batch_size.max(1),
        }
    }

    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Streams changes until the subscriber goes away, the watermark falls
    /// out of the window, or `cancel` fires.
    pub async fn run(
        mut self,
        sender: PoolChangesSender,
        cancel: CancellationToken,
    ) {
        let collection = self.pooler.collection().to_string();
        info!(%collection, start = self.current_index, "pool changes stream started");

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut idle = IdleTimer::new(self.idle_timeout);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(%collection, "pool changes stream cancelled");
                    return;
                }
                _ = sender.closed() => {
                    info!(%collection, "pool changes subscriber disconnected");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let items = match self.pooler.pool(self.current_index) {
                Ok(items) => items,
                Err(e) => {
                    if e.is_out_of_bounds() {
                        info!(%collection, start = self.current_index, "watermark evicted from window: {}", e);
                    } else {
                        warn!(%collection, "pool changes stream failed: {:?}", e);
                    }
                    let _ = sender.send(Err(Status::from(e))).await;
                    return;
                }
            };

            if items.is_empty() {
                if idle.is_expired() {
                    trace!(%collection, "sending heartbeat");
                    if !self.send(&sender, &cancel, PoolChangesResponse::heartbeat()).await {
                        return;
                    }
                    idle.reset();
                }
                continue;
            }

            for batch in items.chunks(self.max_batch_size) {
                let response = match encode_batch(batch) {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(%collection, "failed to encode change batch: {:?}", e);
                        let _ = sender.send(Err(Status::from(e))).await;
                        return;
                    }
                };
                let last = response.last_sequence().unwrap_or(self.current_index);
                if !self.send(&sender, &cancel, response).await {
                    return;
                }
                self.current_index = last;
                self.pooler.metrics().record_stream_batch(&collection);
                trace!(%collection, current_index = last, size = batch.len(), "batch sent");
            }
            idle.reset();
        }
    }

    /// Returns `false` when the loop must stop
    async fn send(
        &self,
        sender: &PoolChangesSender,
        cancel: &CancellationToken,
        response: PoolChangesResponse,
    ) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            sent = sender.send(Ok(response)) => {
                if sent.is_err() {
                    info!(collection = self.pooler.collection(), "pool changes subscriber disconnected");
                }
                sent.is_ok()
            }
        }
    }
}

pub(crate) fn encode_batch<T: Poolable>(items: &[OffsetItem<T>]) -> Result<PoolChangesResponse> {
    let mut changes = Vec::with_capacity(items.len());
    for item in items {
        changes.push(PoolChange {
            name: item.name.clone(),
            sequence: item.sequence,
            value: bincode::serialize(&item.payload)?,
            deleted: item.is_delete(),
        });
    }
    Ok(PoolChangesResponse { changes })
}
