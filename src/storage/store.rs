//! Document store contract consumed by the pooler.
//!
//! The store must provide multi-document ACID transactions, per-document
//! write-conflict detection and an ordered scan over committed documents.

use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tonic::async_trait;

use super::StoredDocument;
use super::TransactionOptions;
use super::TxnId;
use crate::Result;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transaction: Send + Sync + 'static {
    fn id(&self) -> TxnId;

    /// Reads through this transaction's own pending writes
    async fn read(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<StoredDocument>>;

    /// Fails with `DuplicateKey` when the document already exists
    async fn insert(
        &self,
        collection: &str,
        key: &str,
        body: Vec<u8>,
    ) -> Result<()>;

    /// Fails with `DocumentNotFound` when the document does not exist
    async fn replace(
        &self,
        collection: &str,
        key: &str,
        body: Vec<u8>,
    ) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn abort(&self) -> Result<()>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    type Txn: Transaction;

    /// Opens a transaction restricted to `collections`
    async fn begin(
        &self,
        collections: &[String],
        options: TransactionOptions,
    ) -> Result<Arc<Self::Txn>>;

    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<StoredDocument>>;

    /// Committed documents with `key >= start_key`, ascending by key
    async fn scan(
        &self,
        collection: &str,
        start_key: &str,
    ) -> Result<Vec<StoredDocument>>;
}
