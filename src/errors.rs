//! Pooler Error Hierarchy
//!
//! Errors are grouped by layer: pool-level sentinels returned to callers,
//! lock contention, and infrastructure failures coming out of the document
//! store. Sentinels are checked structurally through the `is_*` helpers,
//! never by message.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Replicated table rejections (precondition, retention, validation)
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Write lock contention
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Infrastructure-level failures (storage, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Body failed and the rollback that followed failed too
    #[error("{source}; transaction abort also failed: {abort}")]
    Abort { source: Box<Error>, abort: Box<Error> },
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("{name} already exists")]
    AlreadyExists { name: String },

    #[error("{name} not found")]
    NotFound { name: String },

    /// Update carrying the same content as the live value
    #[error("{name} already exists with identical content")]
    NoChange { name: String },

    /// Requested watermark predates the oldest retained window entry
    #[error("sequence {start} is out of bounds (oldest retained: {first_retained})")]
    OutOfBounds { start: u32, first_retained: u32 },

    /// Local index disagrees with the locked sequence after refresh
    #[error("sequence changed during validation (local index: {local}, locked: {locked})")]
    SequenceChanged { local: u32, locked: u32 },

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("collection {collection} is already locked by another transaction")]
    AlreadyLocked { collection: String },

    /// The lock document exists but cannot be decoded
    #[error("lock document for {collection} is corrupted: {reason}")]
    Corrupted { collection: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Another open transaction holds the write intent, or the document
    /// changed after this transaction read it
    #[error("write-write conflict on {collection}/{key}")]
    WriteConflict { collection: String, key: String },

    #[error("document {collection}/{key} already exists")]
    DuplicateKey { collection: String, key: String },

    #[error("document {collection}/{key} not found")]
    DocumentNotFound { collection: String, key: String },

    /// Collection was not declared when the transaction began
    #[error("collection {collection} is not part of transaction {txn_id}")]
    UndeclaredCollection { collection: String, txn_id: u64 },

    #[error("transaction {0} is no longer open")]
    TransactionClosed(u64),

    /// Commit gate not acquired in time; retryable like lock contention
    #[error("lock wait timed out after {0:?}")]
    LockTimeout(Duration),

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(String),

    /// Checksum or layout validation failures
    #[error("Data corruption detected at {location}")]
    DataCorruption { location: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

// Serialization is classified separately (across storage and wire layers)
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Bincode serialization failed: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Returned by [`crate::Poolable::validate`] for malformed values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl Error {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::Pool(PoolError::AlreadyExists { .. }))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Pool(PoolError::NotFound { .. }))
    }

    pub fn is_no_change(&self) -> bool {
        matches!(self, Error::Pool(PoolError::NoChange { .. }))
    }

    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, Error::Pool(PoolError::OutOfBounds { .. }))
    }

    pub fn is_already_locked(&self) -> bool {
        matches!(self, Error::Lock(LockError::AlreadyLocked { .. }))
    }

    pub fn is_sequence_changed(&self) -> bool {
        matches!(self, Error::Pool(PoolError::SequenceChanged { .. }))
    }

    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Error::System(SystemError::Storage(StorageError::LockTimeout(_))))
    }

    /// Contention signals the caller is expected to retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Abort { source, .. } => source.is_retryable(),
            _ => self.is_already_locked() || self.is_sequence_changed() || self.is_lock_timeout(),
        }
    }
}

// ============== Conversion Implementations ============== //
impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        SerializationError::Bincode(e).into()
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StorageError::DbError(err.to_string()).into()
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::System(SystemError::Metrics(err))
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        Error::System(SystemError::TaskFailed(err))
    }
}

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        match &err {
            Error::Pool(PoolError::AlreadyExists { .. }) | Error::Pool(PoolError::NoChange { .. }) => {
                tonic::Status::already_exists(err.to_string())
            }
            Error::Pool(PoolError::NotFound { .. }) => tonic::Status::not_found(err.to_string()),
            Error::Pool(PoolError::OutOfBounds { .. }) => tonic::Status::out_of_range(err.to_string()),
            Error::Pool(PoolError::InvalidValue { .. }) => tonic::Status::invalid_argument(err.to_string()),
            _ if err.is_retryable() => tonic::Status::aborted(err.to_string()),
            _ => tonic::Status::internal(err.to_string()),
        }
    }
}
