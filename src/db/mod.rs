mod exec;
mod pool;
mod profile;
mod schema;
mod values;

mod tests;

pub use exec::*;
pub use pool::*;
pub use profile::*;
pub use schema::*;
pub use values::*;

use sqlx::{Pool, Sqlite};

pub type DbPool = Pool<Sqlite>;
