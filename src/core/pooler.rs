//! Generic replicated table.
//!
//! A [`Pooler`] folds the document log of one collection into an in-memory
//! name to value map. Mutations are serialized across every process sharing
//! the store through the collection's write lock, and each accepted mutation
//! is appended to the log with the next sequence handed out by that lock.
//!
//! Processes converge eventually: one only learns about another's writes when
//! it refreshes, which happens inside its own next mutation, on the background
//! refresher, or on demand.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::trace;
use tracing::warn;

use super::run_transaction;
use super::sequence_key;
use super::Action;
use super::LockCoordinator;
use super::LockHandle;
use super::LogEntry;
use super::OffsetItem;
use super::OffsetWindow;
use super::Poolable;
use crate::time::now_ms;
use crate::DocumentStore;
use crate::PoolError;
use crate::PoolMetrics;
use crate::PoolerConfig;
use crate::Result;
use crate::Transaction;
use crate::TransactionConfig;
use crate::LOCKS_COLLECTION;

/// Live version of one name
#[derive(Debug, Clone)]
struct PoolEntry<T> {
    value: T,
    entry: LogEntry,
}

#[derive(Debug)]
struct PoolState<T> {
    items: HashMap<String, PoolEntry<T>>,
    /// Next sequence not yet observed
    index: u32,
    window: OffsetWindow<T>,
}

impl<T: Poolable> PoolState<T> {
    fn new() -> Self {
        Self {
            items: HashMap::new(),
            index: 1,
            window: OffsetWindow::new(),
        }
    }

    /// Applies entries in ascending order starting exactly at `index`.
    ///
    /// Entries below the index were already applied by a concurrent refresh
    /// and are skipped; a gap stops the fold so the index never moves past a
    /// sequence that has not been observed.
    fn apply(
        &mut self,
        entries: Vec<(LogEntry, T)>,
        window_max: usize,
    ) -> usize {
        let mut applied = 0;
        for (entry, value) in entries {
            if entry.sequence < self.index {
                continue;
            }
            if entry.sequence > self.index {
                warn!(
                    expected = self.index,
                    found = entry.sequence,
                    "gap in document log, stopping refresh"
                );
                break;
            }

            match entry.action {
                Action::Delete => {
                    self.items.remove(&entry.name);
                }
                Action::Create | Action::Update => {
                    self.items.insert(
                        entry.name.clone(),
                        PoolEntry {
                            value: value.clone(),
                            entry: entry.clone(),
                        },
                    );
                }
            }
            self.window.add(entry.sequence, &entry.name, entry.action, value);
            self.index = entry.sequence + 1;
            applied += 1;
        }
        self.window.trim(window_max);
        applied
    }

    fn snapshot(&self) -> Vec<OffsetItem<T>> {
        let mut items: Vec<OffsetItem<T>> = self
            .items
            .iter()
            .map(|(name, live)| OffsetItem {
                payload: live.value.clone(),
                name: name.clone(),
                sequence: live.entry.sequence,
                action: live.entry.action,
            })
            .collect();
        items.sort_by_key(|item| item.sequence);
        items
    }
}

pub struct Pooler<T: Poolable, S: DocumentStore> {
    collection: String,
    store: Arc<S>,
    lock: LockCoordinator,
    transaction: TransactionConfig,
    window_max: usize,
    state: RwLock<PoolState<T>>,
    metrics: PoolMetrics,
}

impl<T: Poolable, S: DocumentStore> std::fmt::Debug for Pooler<T, S> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Pooler")
            .field("collection", &self.collection)
            .field("index", &self.index())
            .finish()
    }
}

impl<T: Poolable, S: DocumentStore> Pooler<T, S> {
    pub fn new(
        collection: impl Into<String>,
        store: Arc<S>,
        config: &PoolerConfig,
        metrics: PoolMetrics,
    ) -> Self {
        let collection = collection.into();
        Self {
            lock: LockCoordinator::new(collection.clone()),
            collection,
            store,
            transaction: config.transaction.clone(),
            window_max: config.window.max_size,
            state: RwLock::new(PoolState::new()),
            metrics,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    /// Next sequence not yet observed by this process
    pub fn index(&self) -> u32 {
        self.state.read().index
    }

    /// Live value of `name` and the sequence that wrote it
    pub fn item(
        &self,
        name: &str,
    ) -> Option<(T, u32)> {
        self.state
            .read()
            .items
            .get(name)
            .map(|live| (live.value.clone(), live.entry.sequence))
    }

    /// Every live value, ascending by sequence
    pub fn get(&self) -> Vec<OffsetItem<T>> {
        self.state.read().snapshot()
    }

    /// Live values together with the watermark they are consistent with.
    ///
    /// The watermark is the last applied sequence, the value a subscriber
    /// resumes streaming from after loading this snapshot.
    pub fn snapshot(&self) -> (Vec<OffsetItem<T>>, u32) {
        let state = self.state.read();
        (state.snapshot(), state.index - 1)
    }

    /// Retained changes with `sequence > start`
    pub fn pool(
        &self,
        start: u32,
    ) -> Result<Vec<OffsetItem<T>>> {
        self.state.read().window.pool(start)
    }

    /// Folds in every log entry at or after the local index.
    ///
    /// Returns the number of entries applied. The log is read without holding
    /// the state lock; the fold itself only accepts the entry matching the
    /// index at that moment, so concurrent refreshes never apply an entry
    /// twice or out of order.
    #[instrument(skip(self), fields(collection = %self.collection))]
    pub async fn refresh(&self) -> Result<usize> {
        let from = self.index();
        let docs = self.store.scan(&self.collection, &sequence_key(from)).await?;
        if docs.is_empty() {
            return Ok(0);
        }

        let mut entries = Vec::with_capacity(docs.len());
        for doc in &docs {
            let entry = LogEntry::decode(doc)?;
            let value: T = entry.value()?;
            entries.push((entry, value));
        }

        let (applied, index, window_size) = {
            let mut state = self.state.write();
            let applied = state.apply(entries, self.window_max);
            (applied, state.index, state.window.len())
        };

        if applied > 0 {
            debug!(applied, index, "refreshed from document log");
        }
        self.metrics
            .record_refresh(&self.collection, applied, index, window_size);
        Ok(applied)
    }

    pub async fn create(
        &self,
        name: &str,
        value: T,
    ) -> Result<(T, u32)> {
        self.mutate(name, Action::Create, Some(value)).await
    }

    /// Fails with `NoChange` when `value` hashes the same as the live value
    pub async fn update(
        &self,
        name: &str,
        value: T,
    ) -> Result<(T, u32)> {
        self.mutate(name, Action::Update, Some(value)).await
    }

    /// Returns the last live value
    pub async fn delete(
        &self,
        name: &str,
    ) -> Result<(T, u32)> {
        self.mutate(name, Action::Delete, None).await
    }

    #[instrument(skip(self, value), fields(collection = %self.collection))]
    async fn mutate(
        &self,
        name: &str,
        action: Action,
        value: Option<T>,
    ) -> Result<(T, u32)> {
        let collections = [self.collection.clone(), LOCKS_COLLECTION.to_string()];

        let outcome = run_transaction(&*self.store, &collections, &self.transaction, |txn| async move {
            self.lock
                .with_lock(&txn, |txn, handle| self.locked_mutation(txn, handle, name, action, value))
                .await
        })
        .await
        // losing the commit race to another store handle is lock contention too
        .map_err(|e| self.lock.contention(e));

        let (value, sequence) = match outcome {
            Ok(done) => done,
            Err(e) => {
                if e.is_retryable() {
                    self.metrics.record_contention(&self.collection);
                }
                debug!(name, ?action, "mutation rejected: {}", e);
                return Err(e);
            }
        };
        self.metrics.record_mutation(&self.collection, action);
        info!(name, ?action, sequence, "mutation committed");

        // The entry is durable at this point; a failed refresh only delays
        // local visibility until the next one.
        if let Err(e) = self.refresh().await {
            warn!(name, sequence, "refresh after commit failed: {:?}", e);
        }
        Ok((value, sequence))
    }

    async fn locked_mutation<X: Transaction>(
        &self,
        txn: Arc<X>,
        handle: LockHandle,
        name: &str,
        action: Action,
        value: Option<T>,
    ) -> Result<(T, u32)> {
        self.refresh().await?;

        let locked = handle.current_sequence();
        let previous = {
            let state = self.state.read();
            if state.index != locked {
                return Err(PoolError::SequenceChanged {
                    local: state.index,
                    locked,
                }
                .into());
            }
            state.items.get(name).cloned()
        };

        let payload = match (action, previous.as_ref(), value) {
            (Action::Create, Some(_), _) => {
                return Err(PoolError::AlreadyExists { name: name.to_string() }.into())
            }
            (Action::Update | Action::Delete, None, _) => {
                return Err(PoolError::NotFound { name: name.to_string() }.into())
            }
            (Action::Delete, Some(live), _) => live.value.clone(),
            (Action::Create | Action::Update, _, Some(mut value)) => {
                value.validate().map_err(|e| PoolError::InvalidValue {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
                value.clean();
                if let Some(live) = previous.as_ref() {
                    if live.value.content_hash()? == value.content_hash()? {
                        return Err(PoolError::NoChange { name: name.to_string() }.into());
                    }
                }
                value
            }
            (Action::Create | Action::Update, _, None) => {
                return Err(PoolError::InvalidValue {
                    name: name.to_string(),
                    reason: "missing value".to_string(),
                }
                .into())
            }
        };

        let now = now_ms();
        let sequence = handle.next_sequence();
        let entry = LogEntry::new(name, sequence, action, bincode::serialize(&payload)?, now);
        trace!(name, sequence, ?action, "appending log entry");
        txn.insert(&self.collection, &entry.key, entry.encode()?)
            .await
            .map_err(|e| self.lock.contention(e))?;

        if let Some(mut live) = previous {
            live.entry.tombstone(now);
            txn.replace(&self.collection, &live.entry.key, live.entry.encode()?)
                .await
                .map_err(|e| self.lock.contention(e))?;
        }

        Ok((payload, sequence))
    }

    /// Tails the log every `interval` until `shutdown` fires or its sender is
    /// dropped.
    pub fn spawn_refresher(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        let pooler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!(collection = %pooler.collection, "refresher stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = pooler.refresh().await {
                            warn!(collection = %pooler.collection, "background refresh failed: {:?}", e);
                        }
                    }
                }
            }
        })
    }
}
