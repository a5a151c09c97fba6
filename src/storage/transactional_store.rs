//! Transactional document store on top of a [`StorageBackend`].
//!
//! Writes are buffered per transaction and applied atomically on commit.
//! Exclusion is first-writer-wins on a per-document write intent: the first
//! open transaction that writes a document owns it until commit or abort, and
//! any other transaction writing the same document fails immediately with
//! [`StorageError::WriteConflict`]. A transaction that read a document and
//! later writes it also fails if another transaction committed a newer
//! revision in between.
//!
//! Intents only exclude transactions of the same store handle. Handles that
//! share one backend are serialized by the backend repeating the revision
//! check atomically on commit.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::timeout;
use tonic::async_trait;
use tracing::debug;
use tracing::instrument;
use tracing::trace;
use tracing::warn;

use super::DocumentId;
use super::DocumentStore;
use super::DocumentWrite;
use super::StorageBackend;
use super::StoredDocument;
use super::Transaction;
use super::TransactionOptions;
use super::TxnId;
use crate::Result;
use crate::StorageError;

type IntentTable = DashMap<DocumentId, TxnId>;

pub struct TransactionalStore<B: StorageBackend> {
    backend: Arc<B>,
    intents: Arc<IntentTable>,
    commit_gate: Arc<tokio::sync::Mutex<()>>,
    next_txn_id: AtomicU64,
}

impl<B: StorageBackend> TransactionalStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_backend(Arc::new(backend))
    }

    /// Shares one backend between several store handles, the way separate
    /// processes share one database.
    pub fn with_backend(backend: Arc<B>) -> Self {
        Self {
            backend,
            intents: Arc::new(DashMap::new()),
            commit_gate: Arc::new(tokio::sync::Mutex::new(())),
            next_txn_id: AtomicU64::new(1),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Number of documents currently held by open transactions
    pub fn open_intents(&self) -> usize {
        self.intents.len()
    }
}

#[async_trait]
impl<B: StorageBackend> DocumentStore for TransactionalStore<B> {
    type Txn = StoreTransaction<B>;

    #[instrument(skip(self))]
    async fn begin(
        &self,
        collections: &[String],
        options: TransactionOptions,
    ) -> Result<Arc<Self::Txn>> {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        trace!(txn_id = id, "begin transaction");

        Ok(Arc::new(StoreTransaction {
            id,
            collections: collections.iter().cloned().collect(),
            options,
            backend: self.backend.clone(),
            intents: self.intents.clone(),
            commit_gate: self.commit_gate.clone(),
            state: Mutex::new(TxnState::default()),
        }))
    }

    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<StoredDocument>> {
        self.backend.get(collection, key)
    }

    async fn scan(
        &self,
        collection: &str,
        start_key: &str,
    ) -> Result<Vec<StoredDocument>> {
        self.backend.scan(collection, start_key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TxnStatus {
    #[default]
    Open,
    /// Batch handed to the backend; writes stay in place until it resolves
    Committing,
    Committed,
    Aborted,
}

#[derive(Debug, Default)]
struct TxnState {
    status: TxnStatus,
    /// Committed revision seen on first access (`None`: document absent)
    observed: HashMap<DocumentId, Option<u64>>,
    /// Pending writes; every key here has its intent held by this transaction
    writes: BTreeMap<DocumentId, Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Insert,
    Replace,
}

pub struct StoreTransaction<B: StorageBackend> {
    id: TxnId,
    collections: HashSet<String>,
    options: TransactionOptions,
    backend: Arc<B>,
    intents: Arc<IntentTable>,
    commit_gate: Arc<tokio::sync::Mutex<()>>,
    state: Mutex<TxnState>,
}

impl<B: StorageBackend> StoreTransaction<B> {
    fn check_collection(
        &self,
        collection: &str,
    ) -> Result<()> {
        if !self.collections.contains(collection) {
            return Err(StorageError::UndeclaredCollection {
                collection: collection.to_string(),
                txn_id: self.id,
            }
            .into());
        }
        Ok(())
    }

    fn conflict(id: &DocumentId) -> StorageError {
        StorageError::WriteConflict {
            collection: id.collection.clone(),
            key: id.key.clone(),
        }
    }

    /// Returns `true` when the intent was newly acquired
    fn acquire_intent(
        &self,
        id: &DocumentId,
    ) -> Result<bool> {
        match self.intents.entry(id.clone()) {
            Entry::Occupied(holder) if *holder.get() != self.id => {
                debug!(txn_id = self.id, holder = *holder.get(), ?id, "write intent held elsewhere");
                Err(Self::conflict(id).into())
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(self.id);
                Ok(true)
            }
        }
    }

    fn release_intents<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a DocumentId>,
    ) {
        for id in ids {
            self.intents.remove_if(id, |_, holder| *holder == self.id);
        }
    }

    fn write(
        &self,
        collection: &str,
        key: &str,
        body: Vec<u8>,
        mode: WriteMode,
    ) -> Result<()> {
        self.check_collection(collection)?;
        let id = DocumentId::new(collection, key);

        let mut state = self.state.lock();
        if state.status != TxnStatus::Open {
            return Err(StorageError::TransactionClosed(self.id).into());
        }

        let newly_acquired = self.acquire_intent(&id)?;
        let outcome = self.validate_write(&mut state, &id, mode);
        if outcome.is_err() && newly_acquired {
            self.release_intents([&id]);
        }
        outcome?;

        state.writes.insert(id, body);
        Ok(())
    }

    fn validate_write(
        &self,
        state: &mut TxnState,
        id: &DocumentId,
        mode: WriteMode,
    ) -> Result<()> {
        let pending = state.writes.contains_key(id);
        let committed = self.backend.get(&id.collection, &id.key)?.map(|doc| doc.revision);

        match state.observed.get(id) {
            Some(seen) if *seen != committed => return Err(Self::conflict(id).into()),
            Some(_) => {}
            None => {
                state.observed.insert(id.clone(), committed);
            }
        }

        let exists = pending || committed.is_some();
        match mode {
            WriteMode::Insert if exists => Err(StorageError::DuplicateKey {
                collection: id.collection.clone(),
                key: id.key.clone(),
            }
            .into()),
            WriteMode::Replace if !exists => Err(StorageError::DocumentNotFound {
                collection: id.collection.clone(),
                key: id.key.clone(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    /// Closes the transaction and releases every intent it holds
    fn finish(
        &self,
        status: TxnStatus,
    ) -> usize {
        let held: Vec<DocumentId> = {
            let mut state = self.state.lock();
            state.status = status;
            state.observed.clear();
            std::mem::take(&mut state.writes).into_keys().collect()
        };
        self.release_intents(&held);
        held.len()
    }
}

#[async_trait]
impl<B: StorageBackend> Transaction for StoreTransaction<B> {
    fn id(&self) -> TxnId {
        self.id
    }

    async fn read(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<StoredDocument>> {
        self.check_collection(collection)?;
        let id = DocumentId::new(collection, key);

        let mut state = self.state.lock();
        if state.status != TxnStatus::Open {
            return Err(StorageError::TransactionClosed(self.id).into());
        }

        if let Some(body) = state.writes.get(&id) {
            let revision = state.observed.get(&id).copied().flatten().unwrap_or_default();
            return Ok(Some(StoredDocument {
                key: key.to_string(),
                revision,
                body: body.clone(),
            }));
        }

        let doc = self.backend.get(collection, key)?;
        state.observed.entry(id).or_insert(doc.as_ref().map(|d| d.revision));
        Ok(doc)
    }

    async fn insert(
        &self,
        collection: &str,
        key: &str,
        body: Vec<u8>,
    ) -> Result<()> {
        self.write(collection, key, body, WriteMode::Insert)
    }

    async fn replace(
        &self,
        collection: &str,
        key: &str,
        body: Vec<u8>,
    ) -> Result<()> {
        self.write(collection, key, body, WriteMode::Replace)
    }

    #[instrument(skip(self), fields(txn_id = self.id))]
    async fn commit(&self) -> Result<()> {
        // Writes are copied, not moved: if this future is dropped at an await
        // point, Drop still finds them and releases their intents.
        let (writes, observed) = {
            let mut state = self.state.lock();
            if state.status != TxnStatus::Open {
                return Err(StorageError::TransactionClosed(self.id).into());
            }
            state.status = TxnStatus::Committing;
            (state.writes.clone(), state.observed.clone())
        };

        if writes.is_empty() {
            self.finish(TxnStatus::Committed);
            return Ok(());
        }

        let gate = match timeout(self.options.lock_timeout, self.commit_gate.lock()).await {
            Ok(gate) => gate,
            Err(_) => {
                warn!(txn_id = self.id, "commit gate wait timed out");
                self.finish(TxnStatus::Aborted);
                return Err(StorageError::LockTimeout(self.options.lock_timeout).into());
            }
        };

        let mut batch = Vec::with_capacity(writes.len());
        let mut outcome = Ok(());
        for (id, body) in writes {
            match self.backend.next_revision() {
                Ok(revision) => {
                    let expected = observed.get(&id).copied().flatten();
                    batch.push(DocumentWrite {
                        id,
                        revision,
                        body,
                        expected,
                    })
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        if outcome.is_ok() {
            outcome = self.backend.apply(batch, self.options.wait_for_sync).await;
        }
        drop(gate);

        match outcome {
            Ok(()) => {
                let documents = self.finish(TxnStatus::Committed);
                trace!(txn_id = self.id, documents, "transaction committed");
                Ok(())
            }
            Err(e) => {
                warn!(txn_id = self.id, "commit failed: {:?}", e);
                self.finish(TxnStatus::Aborted);
                Err(e)
            }
        }
    }

    #[instrument(skip(self), fields(txn_id = self.id))]
    async fn abort(&self) -> Result<()> {
        if self.state.lock().status != TxnStatus::Open {
            return Err(StorageError::TransactionClosed(self.id).into());
        }
        self.finish(TxnStatus::Aborted);
        trace!(txn_id = self.id, "transaction aborted");
        Ok(())
    }
}

impl<B: StorageBackend> Drop for StoreTransaction<B> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let unfinished = matches!(state.status, TxnStatus::Open | TxnStatus::Committing);
        if unfinished && !state.writes.is_empty() {
            debug!(txn_id = self.id, status = ?state.status, "unfinished transaction dropped, releasing write intents");
            let held: Vec<DocumentId> = state.writes.keys().cloned().collect();
            self.release_intents(&held);
        }
    }
}
