use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use parking_lot::RwLock;
use tonic::async_trait;
use tracing::trace;

use crate::DocumentWrite;
use crate::Result;
use crate::StorageBackend;
use crate::StoredDocument;

/// In-memory backend, one ordered map per collection
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, BTreeMap<String, StoredDocument>>>,
    revision: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed documents in `collection`
    pub fn len(
        &self,
        collection: &str,
    ) -> usize {
        self.collections.read().get(collection).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn is_empty(
        &self,
        collection: &str,
    ) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<StoredDocument>> {
        let collections = self.collections.read();
        Ok(collections.get(collection).and_then(|docs| docs.get(key)).cloned())
    }

    fn scan(
        &self,
        collection: &str,
        start_key: &str,
    ) -> Result<Vec<StoredDocument>> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|docs| docs.range(start_key.to_string()..).map(|(_, doc)| doc.clone()).collect())
            .unwrap_or_default())
    }

    fn next_revision(&self) -> Result<u64> {
        Ok(self.revision.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn apply(
        &self,
        writes: Vec<DocumentWrite>,
        wait_for_sync: bool,
    ) -> Result<()> {
        trace!(len = writes.len(), wait_for_sync, "MemoryBackend apply");

        let mut collections = self.collections.write();
        for write in &writes {
            let committed = collections
                .get(&write.id.collection)
                .and_then(|docs| docs.get(&write.id.key))
                .map(|doc| doc.revision);
            if committed != write.expected {
                trace!(id = ?write.id, ?committed, expected = ?write.expected, "stale write rejected");
                return Err(write.conflict().into());
            }
        }
        for write in writes {
            collections.entry(write.id.collection).or_default().insert(
                write.id.key.clone(),
                StoredDocument {
                    key: write.id.key,
                    revision: write.revision,
                    body: write.body,
                },
            );
        }
        Ok(())
    }
}
