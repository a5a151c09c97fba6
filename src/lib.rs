//! Sequenced, replicated tables over a shared transactional document store.
//!
//! A [`Pooler`] keeps named values consistent across independent processes
//! that share nothing but the store: every mutation is serialized through a
//! single lock document, appended to a gap-free document log and folded into
//! each process's in-memory view on refresh. Subscribers follow changes
//! through the catch-up stream served by [`PoolService`].
mod config;
mod core;
mod errors;
mod metrics;
mod model;
mod network;
mod node;
mod storage;
pub mod utils;

pub use self::core::*;

pub use config::*;
pub use errors::*;
pub use metrics::*;
pub use model::*;
pub use network::*;
pub use node::*;
pub use storage::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
