//! Persisted shapes of the document log.
//!
//! Every mutation appends one [`LogEntry`] to the log collection, keyed by its
//! zero-padded sequence so that key order equals sequence order. The lock
//! collection holds one [`LockDocument`] per log collection.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use crate::LockError;
use crate::Result;
use crate::StoredDocument;

/// Width of the zero-padded sequence key (`u32::MAX` has 10 digits)
const SEQUENCE_KEY_WIDTH: usize = 10;

/// Store key of the log entry carrying `sequence`
pub fn sequence_key(sequence: u32) -> String {
    format!("{:0width$}", sequence, width = SEQUENCE_KEY_WIDTH)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

/// One sequenced mutation of a named object.
///
/// `deleted` is a unix-millisecond tombstone, zero while the entry is the live
/// version of `name`. `spec` carries the encoded value: the new value for
/// create/update, the last live value for delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "_key")]
    pub key: String,
    /// Store revision, filled in when the entry is read back
    #[serde(skip)]
    pub revision: Option<u64>,
    pub name: String,
    pub sequence: u32,
    pub created: u64,
    pub deleted: u64,
    pub action: Action,
    pub spec: Vec<u8>,
}

impl LogEntry {
    pub fn new(
        name: &str,
        sequence: u32,
        action: Action,
        spec: Vec<u8>,
        now_ms: u64,
    ) -> Self {
        // a delete entry never becomes the live version of its name
        let deleted = if action == Action::Delete { now_ms } else { 0 };
        Self {
            key: sequence_key(sequence),
            revision: None,
            name: name.to_string(),
            sequence,
            created: now_ms,
            deleted,
            action,
            spec,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted != 0
    }

    pub fn tombstone(
        &mut self,
        now_ms: u64,
    ) {
        if self.deleted == 0 {
            self.deleted = now_ms.max(1);
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(doc: &StoredDocument) -> Result<Self> {
        let mut entry: LogEntry = bincode::deserialize(&doc.body)?;
        entry.revision = Some(doc.revision);
        Ok(entry)
    }

    /// Decodes the carried value
    pub fn value<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(bincode::deserialize(&self.spec)?)
    }
}

/// Mutual-exclusion document guarding one log collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDocument {
    /// Token rewritten by every lock acquisition
    pub lock: String,
    /// Sequence the next appended entry will receive
    #[serde(rename = "currentSequence")]
    pub current_sequence: u32,
}

impl LockDocument {
    /// Shape of a lock document that has never been written
    pub fn initial() -> Self {
        Self {
            lock: String::new(),
            current_sequence: 1,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(
        collection: &str,
        doc: &StoredDocument,
    ) -> Result<Self> {
        bincode::deserialize(&doc.body).map_err(|e| {
            LockError::Corrupted {
                collection: collection.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}
