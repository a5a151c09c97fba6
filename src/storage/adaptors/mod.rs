mod configured;
mod mem;
mod sled;

pub use configured::*;
pub use mem::*;
pub use sled::*;
