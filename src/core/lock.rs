//! Write lock over one log collection.
//!
//! The lock is a single document in [`LOCKS_COLLECTION`] keyed by the log
//! collection name. Acquiring it rewrites the document's token inside the
//! caller's transaction, so a second open transaction doing the same runs into
//! the store's write-conflict detection. That conflict is reported as
//! [`LockError::AlreadyLocked`].

use std::future::Future;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::debug;
use tracing::instrument;

use super::LockDocument;
use crate::Error;
use crate::LockError;
use crate::Result;
use crate::StorageError;
use crate::SystemError;
use crate::Transaction;
use crate::LOCKS_COLLECTION;

/// View of an acquired lock handed to the locked body.
///
/// Clones share the same counter; the value left in it when the body returns
/// is what gets persisted.
#[derive(Debug, Clone)]
pub struct LockHandle {
    collection: String,
    token: String,
    sequence: Arc<AtomicU32>,
}

impl LockHandle {
    pub(crate) fn new(
        collection: &str,
        token: String,
        current_sequence: u32,
    ) -> Self {
        Self {
            collection: collection.to_string(),
            token,
            sequence: Arc::new(AtomicU32::new(current_sequence)),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Sequence the next appended entry will receive
    pub fn current_sequence(&self) -> u32 {
        self.sequence.load(Ordering::Acquire)
    }

    pub fn set_current_sequence(
        &self,
        sequence: u32,
    ) {
        self.sequence.store(sequence, Ordering::Release);
    }

    /// Hands out the current sequence and advances the counter by one
    pub fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::AcqRel)
    }
}

#[derive(Debug, Clone)]
pub struct LockCoordinator {
    collection: String,
}

impl LockCoordinator {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Runs `body` holding the write lock of this collection.
    ///
    /// Must be called inside an open transaction declaring both the log
    /// collection and [`LOCKS_COLLECTION`]. Re-entrant within the same
    /// transaction.
    #[instrument(skip(self, txn, body), fields(collection = %self.collection, txn_id = txn.id()))]
    pub async fn with_lock<X, F, Fut, R>(
        &self,
        txn: &Arc<X>,
        body: F,
    ) -> Result<R>
    where
        X: Transaction,
        F: FnOnce(Arc<X>, LockHandle) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let mut lock = match txn.read(LOCKS_COLLECTION, &self.collection).await? {
            Some(doc) => LockDocument::decode(&self.collection, &doc)?,
            None => {
                debug!("lock document absent, creating it");
                txn.insert(LOCKS_COLLECTION, &self.collection, LockDocument::initial().encode()?)
                    .await
                    .map_err(|e| self.contention(e))?;
                LockDocument::initial()
            }
        };

        lock.lock = nanoid::nanoid!();
        txn.replace(LOCKS_COLLECTION, &self.collection, lock.encode()?)
            .await
            .map_err(|e| self.contention(e))?;
        debug!(current_sequence = lock.current_sequence, "lock acquired");

        let handle = LockHandle::new(&self.collection, lock.lock.clone(), lock.current_sequence);
        let result = body(txn.clone(), handle.clone()).await?;

        lock.current_sequence = handle.current_sequence();
        txn.replace(LOCKS_COLLECTION, &self.collection, lock.encode()?)
            .await
            .map_err(|e| self.contention(e))?;

        Ok(result)
    }

    /// Maps a store write conflict to `AlreadyLocked`, leaves anything else
    /// untouched.
    ///
    /// A duplicate key counts as a conflict: while the lock is held the only
    /// way a document this transaction creates can already exist is another
    /// holder having committed it first.
    pub fn contention(
        &self,
        err: Error,
    ) -> Error {
        match err {
            Error::System(SystemError::Storage(
                StorageError::WriteConflict { .. } | StorageError::DuplicateKey { .. },
            )) => {
                debug!(collection = %self.collection, "write conflict while holding lock: {:?}", err);
                LockError::AlreadyLocked {
                    collection: self.collection.clone(),
                }
                .into()
            }
            other => other,
        }
    }
}
