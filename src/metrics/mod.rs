//! Prometheus collectors for the pooler.
//!
//! Collectors are registered into a caller supplied [`Registry`]; nothing is
//! registered globally. Create one [`PoolMetrics`] per registry and clone it
//! into every pooler sharing that registry.

use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tracing::error;

use crate::Action;
use crate::Result;


#[derive(Debug, Clone)]
pub struct PoolMetrics {
    mutations: IntCounterVec,
    contention: IntCounterVec,
    refreshed_entries: IntCounterVec,
    index: IntGaugeVec,
    window_size: IntGaugeVec,
    stream_batches: IntCounterVec,
}

impl PoolMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let metrics = Self {
            mutations: IntCounterVec::new(
                Opts::new("pooler_mutations_total", "Committed mutations"),
                &["collection", "action"],
            )?,
            contention: IntCounterVec::new(
                Opts::new(
                    "pooler_contention_total",
                    "Mutations rejected with a retryable contention error",
                ),
                &["collection"],
            )?,
            refreshed_entries: IntCounterVec::new(
                Opts::new("pooler_refreshed_entries_total", "Log entries folded in by refresh"),
                &["collection"],
            )?,
            index: IntGaugeVec::new(
                Opts::new("pooler_index", "Next sequence not yet observed locally"),
                &["collection"],
            )?,
            window_size: IntGaugeVec::new(
                Opts::new("pooler_window_size", "Items retained in the offset window"),
                &["collection"],
            )?,
            stream_batches: IntCounterVec::new(
                Opts::new("pooler_stream_batches_total", "Batches pushed to change subscribers"),
                &["collection"],
            )?,
        };

        registry.register(Box::new(metrics.mutations.clone()))?;
        registry.register(Box::new(metrics.contention.clone()))?;
        registry.register(Box::new(metrics.refreshed_entries.clone()))?;
        registry.register(Box::new(metrics.index.clone()))?;
        registry.register(Box::new(metrics.window_size.clone()))?;
        registry.register(Box::new(metrics.stream_batches.clone()))?;

        Ok(metrics)
    }

    pub(crate) fn record_mutation(
        &self,
        collection: &str,
        action: Action,
    ) {
        let action = match action {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        self.mutations.with_label_values(&[collection, action]).inc();
    }

    pub(crate) fn record_contention(
        &self,
        collection: &str,
    ) {
        self.contention.with_label_values(&[collection]).inc();
    }

    pub(crate) fn record_refresh(
        &self,
        collection: &str,
        applied: usize,
        index: u32,
        window_size: usize,
    ) {
        self.refreshed_entries
            .with_label_values(&[collection])
            .inc_by(applied as u64);
        self.index.with_label_values(&[collection]).set(index as i64);
        self.window_size
            .with_label_values(&[collection])
            .set(window_size as i64);
    }

    pub(crate) fn record_stream_batch(
        &self,
        collection: &str,
    ) {
        self.stream_batches.with_label_values(&[collection]).inc();
    }
}

/// Renders `registry` in the Prometheus text exposition format
pub fn gather_text(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode pooler metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("pooler metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
