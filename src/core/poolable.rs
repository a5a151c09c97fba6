use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;
use crate::ValidationError;

/// Value type replicated by a [`crate::Pooler`].
///
/// Values travel through the log as bincode, so anything that serializes
/// deterministically can be pooled.
pub trait Poolable: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Rejects malformed values before anything is written
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        Ok(())
    }

    /// Normalizes the value right before it is persisted
    fn clean(&mut self) {}

    /// Stable content fingerprint used to detect no-op updates
    fn content_hash(&self) -> Result<String> {
        let bytes = bincode::serialize(self)?;
        let mut crc = flate2::Crc::new();
        crc.update(&bytes);
        Ok(format!("{:08x}-{}", crc.sum(), crc.amount()))
    }
}
