//! Raw document persistence underneath the transactional store.
//!
//! A backend only knows how to read committed documents and how to apply a
//! batch atomically. Transactions and write intents live one layer up in
//! [`crate::TransactionalStore`]; the backend's only part in conflict
//! detection is the revision check performed by `apply`, which is what
//! serializes store handles sharing one database.

#[cfg(test)]
use mockall::automock;
use tonic::async_trait;

use super::DocumentWrite;
use super::StoredDocument;
use crate::Result;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<StoredDocument>>;

    /// Committed documents with `key >= start_key`, ascending by key
    fn scan(
        &self,
        collection: &str,
        start_key: &str,
    ) -> Result<Vec<StoredDocument>>;

    /// Strictly increasing across the lifetime of the backend
    fn next_revision(&self) -> Result<u64>;

    /// Applies every write or none of them.
    ///
    /// Fails with `WriteConflict` when a document's committed revision no
    /// longer matches [`DocumentWrite::expected`].
    async fn apply(
        &self,
        writes: Vec<DocumentWrite>,
        wait_for_sync: bool,
    ) -> Result<()>;
}
