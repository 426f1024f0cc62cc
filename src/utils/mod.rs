mod hash;
mod sql;

pub use hash::*;
pub use sql::*;
