//! Simple in-memory storage implementation using DashMap
//!
//! Rows live for the lifetime of the process. Each key remembers the
//! sequence number of its first insert so listings come back in insertion
//! order, the way a table scan would.

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::error::StoreError;
use crate::core::types::{BlockConfig, BlockKey};
use crate::storage::BlockStorage;

struct StoredRow {
    seq: u64,
    row: BlockConfig,
}

/// DashMap-backed storage
pub struct MemoryStorage {
    rows: DashMap<BlockKey, StoredRow>,
    next_seq: AtomicU64,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    fn sorted(&self, mut entries: Vec<(u64, BlockConfig)>) -> Vec<BlockConfig> {
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, row)| row).collect()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStorage for MemoryStorage {
    fn get(&self, key: &BlockKey) -> Result<Option<BlockConfig>, StoreError> {
        Ok(self.rows.get(key).map(|entry| entry.row.clone()))
    }

    fn put(&self, row: BlockConfig) -> Result<(), StoreError> {
        let key = row.key();
        tracing::debug!("MemoryStorage::put {}", key);
        match self.rows.entry(key) {
            MapEntry::Occupied(mut occupied) => occupied.get_mut().row = row,
            MapEntry::Vacant(vacant) => {
                vacant.insert(StoredRow {
                    seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                    row,
                });
            }
        }
        Ok(())
    }

    fn update(
        &self,
        key: &BlockKey,
        apply: &mut dyn FnMut(&mut BlockConfig),
    ) -> Result<BlockConfig, StoreError> {
        tracing::debug!("MemoryStorage::update {}", key);
        // The entry guard holds the shard lock until the row is written back
        match self.rows.entry(key.clone()) {
            MapEntry::Occupied(mut occupied) => {
                let stored = occupied.get_mut();
                apply(&mut stored.row);
                Ok(stored.row.clone())
            }
            MapEntry::Vacant(vacant) => {
                let mut row = BlockConfig::empty(key);
                apply(&mut row);
                vacant.insert(StoredRow {
                    seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                    row: row.clone(),
                });
                Ok(row)
            }
        }
    }

    fn list_by_path(&self, path: &str) -> Result<Vec<BlockConfig>, StoreError> {
        let entries = self
            .rows
            .iter()
            .filter(|entry| entry.key().path == path)
            .map(|entry| (entry.seq, entry.row.clone()))
            .collect();
        Ok(self.sorted(entries))
    }

    fn list_all(&self) -> Result<Vec<BlockConfig>, StoreError> {
        let entries = self
            .rows
            .iter()
            .map(|entry| (entry.seq, entry.row.clone()))
            .collect();
        Ok(self.sorted(entries))
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.rows.len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
