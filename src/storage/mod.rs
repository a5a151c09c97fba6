//! Document store layer: the transactional contract the pooler relies on and
//! the engines implementing it.
mod adaptors;
mod backend;
mod document;
mod store;
mod transactional_store;


pub use adaptors::*;
pub use backend::*;
pub use document::*;
pub use store::*;
pub use transactional_store::*;

/// Reserved collection holding one lock document per log collection
pub const LOCKS_COLLECTION: &str = "_locks";
