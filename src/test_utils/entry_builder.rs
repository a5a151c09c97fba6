use crate::Action;
use crate::DocumentStore;
use crate::LogEntry;
use crate::Result;
use crate::Transaction;
use crate::TransactionOptions;

use super::Spec;

/// Writes log entries straight into the store, bypassing the lock
pub struct EntryBuilder {
    sequence: u32,
    entries: Vec<LogEntry>,
}

impl EntryBuilder {
    pub fn new(start_sequence: u32) -> Self {
        Self {
            sequence: start_sequence,
            entries: Vec::new(),
        }
    }

    pub fn entry(
        mut self,
        name: &str,
        action: Action,
        body: &str,
    ) -> Self {
        let spec = bincode::serialize(&Spec::new(body)).unwrap();
        self.entries
            .push(LogEntry::new(name, self.sequence, action, spec, 1_000 + self.sequence as u64));
        self.sequence += 1;
        self
    }

    /// Leaves a hole in the sequence
    pub fn skip(mut self) -> Self {
        self.sequence += 1;
        self
    }

    pub fn build(self) -> Vec<LogEntry> {
        self.entries
    }

    pub async fn commit<S: DocumentStore>(
        self,
        store: &S,
        collection: &str,
    ) -> Result<Vec<LogEntry>> {
        let txn = store
            .begin(&[collection.to_string()], TransactionOptions::default())
            .await?;
        for entry in &self.entries {
            txn.insert(collection, &entry.key, entry.encode()?).await?;
        }
        txn.commit().await?;
        Ok(self.entries)
    }
}
