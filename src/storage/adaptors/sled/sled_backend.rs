use sled::transaction::ConflictableTransactionError;
use sled::transaction::ConflictableTransactionResult;
use sled::transaction::TransactionError;
use sled::Tree;
use tonic::async_trait;
use tracing::instrument;
use tracing::trace;

use super::init_sled_document_db;
use super::DOCUMENTS_TREE;
use crate::DocumentWrite;
use crate::Error;
use crate::Result;
use crate::StorageBackend;
use crate::StorageConfig;
use crate::StorageError;
use crate::StoredDocument;

const KEY_SEPARATOR: u8 = 0x00;

/// Durable backend storing every collection in one sled tree.
///
/// Keys are `collection \0 key`, so a range scan over one collection is a
/// contiguous, key-ordered slice of the tree and a commit batch spanning
/// several collections is a single tree transaction.
pub struct SledBackend {
    db: sled::Db,
    tree: Tree,
}

impl std::fmt::Debug for SledBackend {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledBackend").field("documents", &self.tree.len()).finish()
    }
}

impl SledBackend {
    pub fn new(db: sled::Db) -> Result<Self> {
        let tree = db.open_tree(DOCUMENTS_TREE)?;
        Ok(Self { db, tree })
    }

    pub fn open(config: &StorageConfig) -> Result<Self> {
        Self::new(init_sled_document_db(&config.db_path, config.cache_capacity_bytes)?)
    }

    fn document_key(
        collection: &str,
        key: &str,
    ) -> Vec<u8> {
        let mut buf = Vec::with_capacity(collection.len() + key.len() + 1);
        buf.extend_from_slice(collection.as_bytes());
        buf.push(KEY_SEPARATOR);
        buf.extend_from_slice(key.as_bytes());
        buf
    }

    /// First key past every document of `collection`
    fn collection_end(collection: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(collection.len() + 1);
        buf.extend_from_slice(collection.as_bytes());
        buf.push(KEY_SEPARATOR + 1);
        buf
    }

    fn decode(
        raw_key: &[u8],
        value: &[u8],
    ) -> Result<StoredDocument> {
        bincode::deserialize(value).map_err(|e| {
            StorageError::DataCorruption {
                location: format!("{}: {}", String::from_utf8_lossy(raw_key), e),
            }
            .into()
        })
    }
}

#[async_trait]
impl StorageBackend for SledBackend {
    #[instrument(skip(self))]
    fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<StoredDocument>> {
        let raw_key = Self::document_key(collection, key);
        match self.tree.get(&raw_key)? {
            Some(value) => Self::decode(&raw_key, &value).map(Some),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    fn scan(
        &self,
        collection: &str,
        start_key: &str,
    ) -> Result<Vec<StoredDocument>> {
        let start = Self::document_key(collection, start_key);
        let end = Self::collection_end(collection);

        let mut docs = Vec::new();
        for item in self.tree.range(start..end) {
            let (raw_key, value) = item?;
            docs.push(Self::decode(&raw_key, &value)?);
        }
        Ok(docs)
    }

    fn next_revision(&self) -> Result<u64> {
        Ok(self.db.generate_id()? + 1)
    }

    #[instrument(skip(self, writes))]
    async fn apply(
        &self,
        writes: Vec<DocumentWrite>,
        wait_for_sync: bool,
    ) -> Result<()> {
        trace!("apply len = {:?}", writes.len());

        let mut staged = Vec::with_capacity(writes.len());
        for write in &writes {
            let doc = StoredDocument {
                key: write.id.key.clone(),
                revision: write.revision,
                body: write.body.clone(),
            };
            staged.push((Self::document_key(&write.id.collection, &write.id.key), bincode::serialize(&doc)?));
        }

        self.tree
            .transaction(|tx| -> ConflictableTransactionResult<(), Error> {
                for (write, (raw_key, value)) in writes.iter().zip(&staged) {
                    let committed = match tx.get(raw_key)? {
                        Some(current) => Some(
                            Self::decode(raw_key, &current)
                                .map_err(ConflictableTransactionError::Abort)?
                                .revision,
                        ),
                        None => None,
                    };
                    if committed != write.expected {
                        return Err(ConflictableTransactionError::Abort(write.conflict().into()));
                    }
                    tx.insert(raw_key.as_slice(), value.as_slice())?;
                }
                Ok(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => Error::from(e),
            })?;

        if wait_for_sync {
            self.tree.flush_async().await?;
        }
        Ok(())
    }
}
