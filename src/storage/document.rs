use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::TransactionConfig;

pub type TxnId = u64;

/// Fully qualified address of one document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId {
    pub collection: String,
    pub key: String,
}

impl DocumentId {
    pub fn new(
        collection: &str,
        key: &str,
    ) -> Self {
        Self {
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }
}

/// Committed document as returned by the store.
///
/// `revision` is assigned by the store on every committed write and is what
/// write-conflict detection compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub key: String,
    pub revision: u64,
    pub body: Vec<u8>,
}

/// One element of an atomic commit batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentWrite {
    pub id: DocumentId,
    pub revision: u64,
    pub body: Vec<u8>,
    /// Committed revision the writer based this write on; `None` when it saw
    /// no document
    pub expected: Option<u64>,
}

impl DocumentWrite {
    pub(crate) fn conflict(&self) -> crate::StorageError {
        crate::StorageError::WriteConflict {
            collection: self.id.collection.clone(),
            key: self.id.key.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Upper bound on waiting for the store's commit gate
    pub lock_timeout: Duration,
    /// Flush before the commit is acknowledged
    pub wait_for_sync: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        (&TransactionConfig::default()).into()
    }
}

impl From<&TransactionConfig> for TransactionOptions {
    fn from(config: &TransactionConfig) -> Self {
        Self {
            lock_timeout: config.lock_timeout(),
            wait_for_sync: config.wait_for_sync,
        }
    }
}
