//! Storage layer for block configuration rows
//!
//! Backends only know rows: point lookup, upsert, listing. The draft/publish
//! semantics live in [`ConfigStore`], which works over any backend.
//!
//! Backends never retry and there is no version check. Lifecycle writes go
//! through [`BlockStorage::update`], which applies a change to one row while
//! holding that row (memory) or the connection plus a write transaction
//! (SQLite), so concurrent writers to the same key never rebuild a row from a
//! stale copy. Each write wins only for the columns it changes.

use crate::core::error::StoreError;
use crate::core::types::{BlockConfig, BlockKey};

/// Trait for block configuration storage implementations
pub trait BlockStorage: Send + Sync {
    /// Point lookup by `(path, block_id)`
    fn get(&self, key: &BlockKey) -> Result<Option<BlockConfig>, StoreError>;

    /// Insert or replace the row with the same key
    fn put(&self, row: BlockConfig) -> Result<(), StoreError>;

    /// Atomically change one row. `apply` sees the current row, or an empty
    /// row when none exists yet, and the result is written back before any
    /// other writer to the same key can read it. Returns the stored row.
    fn update(
        &self,
        key: &BlockKey,
        apply: &mut dyn FnMut(&mut BlockConfig),
    ) -> Result<BlockConfig, StoreError>;

    /// All rows for a page, in storage order
    fn list_by_path(&self, path: &str) -> Result<Vec<BlockConfig>, StoreError>;

    /// Every stored row
    fn list_all(&self) -> Result<Vec<BlockConfig>, StoreError>;

    /// Number of stored rows
    fn count(&self) -> Result<usize, StoreError>;

    /// Short backend name for diagnostics
    fn backend_name(&self) -> &'static str;
}

/// In-memory backend
pub mod memory;

/// SQLite backend
pub mod sqlite;

/// Draft/publish operations over a backend
pub mod config_store;

pub use config_store::ConfigStore;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Helper trait that combines all requirements for storage implementations
/// This cleans up generic bounds throughout the codebase
pub trait StorageImpl: BlockStorage + Send + Sync + 'static {}

/// Blanket implementation for any type that meets the requirements
impl<T> StorageImpl for T where T: BlockStorage + Send + Sync + 'static {}
