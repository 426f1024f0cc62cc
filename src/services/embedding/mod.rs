//! Per-column value collections over LanceDB.
//!
//! Split into submodules:
//! - `index`: the process-wide collection registry and search entry points
//! - `store`: LanceDB storage operations

mod index;
mod store;

pub use index::{CollectionInfo, EmbeddingIndex, ValueMatch};

// Column name constants (used by both index and store)
pub(crate) const COLUMN_VALUE_ID: &str = "value_id";
pub(crate) const COLUMN_SOURCE_TABLE: &str = "source_table";
pub(crate) const COLUMN_SOURCE_COLUMN: &str = "source_column";
pub(crate) const COLUMN_VALUE_TEXT: &str = "value_text";
pub(crate) const COLUMN_VALUE_HASH: &str = "value_hash";
pub(crate) const COLUMN_CREATED_AT: &str = "created_at";
pub(crate) const COLUMN_VECTOR: &str = "vector";
pub(crate) const COLUMN_DISTANCE: &str = "_distance";
