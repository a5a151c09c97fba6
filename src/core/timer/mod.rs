mod idle_timer;

pub use idle_timer::*;
