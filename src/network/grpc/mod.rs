//! gRPC-facing handlers of the pool RPC surface.
mod pool_changes_handler;
mod pool_service;

pub use pool_changes_handler::*;
pub use pool_service::*;
