mod lock;
mod log;
mod poolable;
mod pooler;
mod timer;
mod transaction;
mod window;

pub use lock::*;
pub use log::*;
pub use poolable::*;
pub use pooler::*;
pub use timer::*;
pub use transaction::*;
pub use window::*;
