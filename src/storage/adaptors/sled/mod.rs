mod sled_backend;

pub use sled_backend::*;


use crate::Error;

//---
// Database namespaces
/// Sled tree holding every collection, keyed by `collection \0 key`
pub(crate) const DOCUMENTS_TREE: &str = "_documents";

#[doc(hidden)]
pub fn init_sled_document_db(
    sled_db_root_path: impl AsRef<std::path::Path> + std::fmt::Debug,
    cache_capacity_bytes: u64,
) -> Result<sled::Db, Error> {
    tracing::debug!("init_sled_document_db from path: {:?}", &sled_db_root_path);

    let path = sled_db_root_path.as_ref();
    let document_db_path = path.join("documents");

    sled::Config::default()
        .path(&document_db_path)
        .cache_capacity(cache_capacity_bytes)
        .use_compression(true)
        .compression_factor(1)
        .mode(sled::Mode::HighThroughput)
        .open()
        .map_err(|e| {
            tracing::warn!(
                "Try to open DB at this location: {:?} and failed: {:?}",
                document_db_path,
                e
            );
            e.into()
        })
}
