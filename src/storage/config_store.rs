//! Config Store: draft, publish and direct-save operations
//!
//! Each lifecycle operation is one atomic backend `update` that touches only
//! its own columns: a draft save never rewrites live props, and a direct save
//! never rewrites the draft. There is no cross-row transaction and no version
//! check, so two writers of the same column resolve as last-write-wins.

use chrono::Utc;
use std::sync::Arc;

use crate::core::error::{Error, Result};
use crate::core::types::{BlockConfig, BlockKey, Props};
use crate::storage::StorageImpl;
use crate::system::metrics::Metrics;

/// Outcome of a bulk upsert
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BulkReport {
    /// Rows written
    pub written: usize,
    /// Rows rejected by validation or failed to write
    pub skipped: usize,
}

/// Validated, trimmed key
fn validate_key(path: &str, block_id: &str) -> Result<BlockKey> {
    let path = path.trim();
    let block_id = block_id.trim();
    if path.is_empty() {
        return Err(Error::validation("path must not be empty"));
    }
    if block_id.is_empty() {
        return Err(Error::validation("block id must not be empty"));
    }
    Ok(BlockKey::new(path, block_id))
}

/// Block configuration store over a storage backend
pub struct ConfigStore<S: StorageImpl> {
    backend: Arc<S>,
}

impl<S: StorageImpl> Clone for ConfigStore<S> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
        }
    }
}

impl<S: StorageImpl> ConfigStore<S> {
    /// Wrap a backend
    pub fn new(backend: S) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Underlying backend
    pub fn backend(&self) -> &S {
        &self.backend
    }

    fn modify(
        &self,
        key: &BlockKey,
        mut apply: impl FnMut(&mut BlockConfig),
    ) -> Result<BlockConfig> {
        let now = Utc::now();
        self.backend
            .update(key, &mut |row| {
                apply(row);
                row.updated_at = now;
            })
            .map_err(|e| {
                tracing::error!("Store update failed for {}: {}", key, e);
                Metrics::global().store_errors.inc();
                Error::from(e)
            })
    }

    fn write(&self, mut row: BlockConfig) -> Result<BlockConfig> {
        row.updated_at = Utc::now();
        self.backend.put(row.clone()).map_err(|e| {
            tracing::error!("Store write failed for {}#{}: {}", row.path, row.block_id, e);
            Metrics::global().store_errors.inc();
            Error::from(e)
        })?;
        Ok(row)
    }

    /// Look up one row
    pub fn get(&self, path: &str, block_id: &str) -> Result<Option<BlockConfig>> {
        let key = validate_key(path, block_id)?;
        Ok(self.backend.get(&key)?)
    }

    /// Save unpublished edits. Creates the row on first use; leaves `props`
    /// and `is_published` untouched. `block_type` is only changed when given.
    pub fn upsert_draft(
        &self,
        path: &str,
        block_id: &str,
        block_type: Option<&str>,
        props: Props,
    ) -> Result<BlockConfig> {
        let key = validate_key(path, block_id)?;
        let block_type = block_type.map(str::trim).filter(|t| !t.is_empty());
        let row = self.modify(&key, |row| {
            if let Some(block_type) = block_type {
                row.block_type = block_type.to_string();
            }
            row.draft_props = Some(props.clone());
        })?;
        Metrics::global().drafts_saved.inc();
        tracing::debug!("Draft saved for {}", key);
        Ok(row)
    }

    /// Promote the current draft to the live props. An absent draft (or an
    /// absent row) publishes an empty configuration. The draft is retained.
    pub fn publish(&self, path: &str, block_id: &str) -> Result<BlockConfig> {
        let key = validate_key(path, block_id)?;
        let row = self.modify(&key, |row| {
            row.props = row.draft_props.clone().unwrap_or_default();
            row.is_published = true;
        })?;
        Metrics::global().blocks_published.inc();
        tracing::debug!("Published {}", key);
        Ok(row)
    }

    /// Write straight to the live props, bypassing the draft stage.
    /// `draft_props` is left as it was.
    pub fn upsert_published(
        &self,
        path: &str,
        block_id: &str,
        block_type: Option<&str>,
        props: Props,
    ) -> Result<BlockConfig> {
        let key = validate_key(path, block_id)?;
        let block_type = block_type.map(str::trim).filter(|t| !t.is_empty());
        let row = self.modify(&key, |row| {
            if let Some(block_type) = block_type {
                row.block_type = block_type.to_string();
            }
            row.props = props.clone();
            row.is_published = true;
        })?;
        Metrics::global().direct_saves.inc();
        tracing::debug!("Direct save for {}", key);
        Ok(row)
    }

    /// All rows for a page, unordered beyond what the backend returns
    pub fn list_by_path(&self, path: &str) -> Result<Vec<BlockConfig>> {
        let path = path.trim();
        if path.is_empty() {
            return Err(Error::validation("path must not be empty"));
        }
        Ok(self.backend.list_by_path(path)?)
    }

    /// Every stored row
    pub fn list_all(&self) -> Result<Vec<BlockConfig>> {
        Ok(self.backend.list_all()?)
    }

    /// Number of stored rows
    pub fn count(&self) -> Result<usize> {
        Ok(self.backend.count()?)
    }

    /// Insert or replace many rows. Each row stands alone: invalid rows and
    /// failed writes are skipped and counted, the rest are written.
    pub fn bulk_upsert(&self, rows: Vec<BlockConfig>) -> BulkReport {
        let mut report = BulkReport::default();

        for mut row in rows {
            let key = match validate_key(&row.path, &row.block_id) {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!("Skipping import row: {}", e);
                    report.skipped += 1;
                    continue;
                }
            };
            row.path = key.path;
            row.block_id = key.block_id;

            match self.write(row) {
                Ok(_) => report.written += 1,
                Err(_) => report.skipped += 1,
            }
        }

        Metrics::global().rows_imported.inc_by(report.written as u64);
        tracing::info!(
            "Bulk upsert finished: {} written, {} skipped",
            report.written,
            report.skipped
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::StoreError;
    use crate::storage::{BlockStorage, MemoryStorage, SqliteStorage};
    use serde_json::json;

    fn props(value: serde_json::Value) -> Props {
        value.as_object().cloned().unwrap()
    }

    fn memory_store() -> ConfigStore<MemoryStorage> {
        ConfigStore::new(MemoryStorage::new())
    }

    #[test]
    fn test_first_draft_creates_unpublished_row() {
        let store = memory_store();
        let row = store
            .upsert_draft("/", "hero-1", Some("HeroBlock"), props(json!({"title": "Old"})))
            .unwrap();

        assert_eq!(row.block_type, "HeroBlock");
        assert_eq!(row.draft_props, Some(props(json!({"title": "Old"}))));
        assert!(row.props.is_empty());
        assert!(!row.is_published);
    }

    #[test]
    fn test_empty_key_parts_are_rejected() {
        let store = memory_store();
        assert!(matches!(
            store.upsert_draft("", "hero", None, Props::new()),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.upsert_draft("/", "   ", None, Props::new()),
            Err(Error::Validation(_))
        ));
        assert!(matches!(store.publish(" ", "x"), Err(Error::Validation(_))));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_draft_is_idempotent() {
        let store = memory_store();
        let draft = props(json!({"title": "Same"}));
        store.upsert_draft("/", "hero", Some("HeroBlock"), draft.clone()).unwrap();
        store.upsert_draft("/", "hero", Some("HeroBlock"), draft.clone()).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let row = store.get("/", "hero").unwrap().unwrap();
        assert_eq!(row.draft_props, Some(draft));
    }

    #[test]
    fn test_draft_without_type_keeps_existing_type() {
        let store = memory_store();
        store.upsert_draft("/", "hero", Some("HeroBlock"), Props::new()).unwrap();
        let row = store.upsert_draft("/", "hero", None, Props::new()).unwrap();
        assert_eq!(row.block_type, "HeroBlock");
    }

    #[test]
    fn test_publish_copies_draft_and_retains_it() {
        let store = memory_store();
        store
            .upsert_draft("/", "hero", None, props(json!({"title": "Old"})))
            .unwrap();
        let row = store.publish("/", "hero").unwrap();

        assert!(row.is_published);
        assert_eq!(row.props, props(json!({"title": "Old"})));
        assert_eq!(row.draft_props, Some(props(json!({"title": "Old"}))));
    }

    #[test]
    fn test_publish_without_draft_publishes_empty() {
        let store = memory_store();
        let row = store.publish("/pricing", "calc").unwrap();

        assert!(row.is_published);
        assert!(row.props.is_empty());
        assert!(row.draft_props.is_none());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_new_draft_does_not_touch_live_props() {
        let store = memory_store();
        store
            .upsert_draft("/", "hero", None, props(json!({"title": "Old"})))
            .unwrap();
        store.publish("/", "hero").unwrap();
        let row = store
            .upsert_draft("/", "hero", None, props(json!({"title": "New"})))
            .unwrap();

        assert_eq!(row.props, props(json!({"title": "Old"})));
        assert_eq!(row.draft_props, Some(props(json!({"title": "New"}))));
        assert!(row.is_published);
    }

    #[test]
    fn test_direct_save_leaves_draft_alone() {
        let store = memory_store();
        store
            .upsert_draft("/", "hero", None, props(json!({"title": "Draft"})))
            .unwrap();
        let row = store
            .upsert_published("/", "hero", Some("HeroBlock"), props(json!({"title": "Direct"})))
            .unwrap();

        assert!(row.is_published);
        assert_eq!(row.props, props(json!({"title": "Direct"})));
        assert_eq!(row.draft_props, Some(props(json!({"title": "Draft"}))));
        assert_eq!(row.block_type, "HeroBlock");
    }

    #[test]
    fn test_last_write_wins() {
        let store = memory_store();
        store.upsert_draft("/", "hero", None, props(json!({"a": 1}))).unwrap();
        store.upsert_draft("/", "hero", None, props(json!({"b": 2}))).unwrap();

        let row = store.get("/", "hero").unwrap().unwrap();
        assert_eq!(row.draft_props, Some(props(json!({"b": 2}))));
    }

    #[test]
    fn test_bulk_upsert_skips_invalid_rows() {
        let store = memory_store();
        let mut good = BlockConfig::empty(&BlockKey::new("/", "hero"));
        good.props = props(json!({"title": "Imported"}));
        good.is_published = true;
        let bad = BlockConfig::empty(&BlockKey::new("", "orphan"));

        let report = store.bulk_upsert(vec![good, bad]);
        assert_eq!(report, BulkReport { written: 1, skipped: 1 });
        assert!(store.get("/", "hero").unwrap().unwrap().is_live());
    }

    struct FailingStorage;

    impl BlockStorage for FailingStorage {
        fn get(&self, _key: &BlockKey) -> std::result::Result<Option<BlockConfig>, StoreError> {
            Ok(None)
        }
        fn put(&self, _row: BlockConfig) -> std::result::Result<(), StoreError> {
            Err(StoreError::Backend("connection reset".into()))
        }
        fn update(
            &self,
            _key: &BlockKey,
            _apply: &mut dyn FnMut(&mut BlockConfig),
        ) -> std::result::Result<BlockConfig, StoreError> {
            Err(StoreError::Backend("connection reset".into()))
        }
        fn list_by_path(&self, _path: &str) -> std::result::Result<Vec<BlockConfig>, StoreError> {
            Ok(Vec::new())
        }
        fn list_all(&self) -> std::result::Result<Vec<BlockConfig>, StoreError> {
            Ok(Vec::new())
        }
        fn count(&self) -> std::result::Result<usize, StoreError> {
            Ok(0)
        }
        fn backend_name(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_backend_failure_surfaces_as_store_error() {
        let store = ConfigStore::new(FailingStorage);
        let result = store.upsert_draft("/", "hero", None, Props::new());
        assert!(matches!(result, Err(Error::Store(StoreError::Backend(_)))));

        let report = store.bulk_upsert(vec![BlockConfig::empty(&BlockKey::new("/", "a"))]);
        assert_eq!(report, BulkReport { written: 0, skipped: 1 });
    }

    /// Memory backend that lets one direct save of live props land while the
    /// next write to the key is in flight: after a point read has returned
    /// its snapshot, or just before an update takes the row.
    struct InterleavedDirectSave {
        inner: MemoryStorage,
        pending: parking_lot::Mutex<Option<Props>>,
    }

    impl InterleavedDirectSave {
        fn new(live: Props) -> Self {
            Self {
                inner: MemoryStorage::new(),
                pending: parking_lot::Mutex::new(Some(live)),
            }
        }

        fn land_pending(&self, key: &BlockKey) {
            if let Some(live) = self.pending.lock().take() {
                self.inner
                    .update(key, &mut |row| {
                        row.props = live.clone();
                        row.is_published = true;
                    })
                    .unwrap();
            }
        }
    }

    impl BlockStorage for InterleavedDirectSave {
        fn get(&self, key: &BlockKey) -> std::result::Result<Option<BlockConfig>, StoreError> {
            let snapshot = self.inner.get(key)?;
            self.land_pending(key);
            Ok(snapshot)
        }
        fn put(&self, row: BlockConfig) -> std::result::Result<(), StoreError> {
            self.inner.put(row)
        }
        fn update(
            &self,
            key: &BlockKey,
            apply: &mut dyn FnMut(&mut BlockConfig),
        ) -> std::result::Result<BlockConfig, StoreError> {
            self.land_pending(key);
            self.inner.update(key, apply)
        }
        fn list_by_path(&self, path: &str) -> std::result::Result<Vec<BlockConfig>, StoreError> {
            self.inner.list_by_path(path)
        }
        fn list_all(&self) -> std::result::Result<Vec<BlockConfig>, StoreError> {
            self.inner.list_all()
        }
        fn count(&self) -> std::result::Result<usize, StoreError> {
            self.inner.count()
        }
        fn backend_name(&self) -> &'static str {
            "interleaved"
        }
    }

    #[test]
    fn test_draft_save_never_reverts_concurrent_direct_save() {
        let store = ConfigStore::new(InterleavedDirectSave::new(props(
            json!({"title": "DirectConcurrent"}),
        )));
        store
            .backend()
            .inner
            .put({
                let mut row = BlockConfig::empty(&BlockKey::new("/", "hero"));
                row.props = props(json!({"title": "Old"}));
                row.is_published = true;
                row
            })
            .unwrap();

        store
            .upsert_draft("/", "hero", None, props(json!({"title": "Draft"})))
            .unwrap();

        let row = store.get("/", "hero").unwrap().unwrap();
        assert_eq!(row.props, props(json!({"title": "DirectConcurrent"})));
        assert_eq!(row.draft_props, Some(props(json!({"title": "Draft"}))));
        assert!(row.is_published);
    }

    fn race_draft_and_direct_saves<S: StorageImpl>(store: ConfigStore<S>) {
        const ROUNDS: i64 = 200;
        let drafts = store.clone();
        let directs = store.clone();

        let draft_writer = std::thread::spawn(move || {
            for i in 0..ROUNDS {
                drafts
                    .upsert_draft("/", "hero", Some("HeroBlock"), props(json!({"draft": i})))
                    .unwrap();
            }
        });
        let direct_writer = std::thread::spawn(move || {
            for i in 0..ROUNDS {
                directs
                    .upsert_published("/", "hero", None, props(json!({"live": i})))
                    .unwrap();
            }
        });
        draft_writer.join().unwrap();
        direct_writer.join().unwrap();

        let row = store.get("/", "hero").unwrap().unwrap();
        assert_eq!(row.props, props(json!({"live": ROUNDS - 1})));
        assert_eq!(row.draft_props, Some(props(json!({"draft": ROUNDS - 1}))));
        assert_eq!(row.block_type, "HeroBlock");
        assert!(row.is_published);
    }

    #[test]
    fn test_concurrent_draft_and_direct_saves_keep_both_columns_memory() {
        race_draft_and_direct_saves(memory_store());
    }

    #[test]
    fn test_concurrent_draft_and_direct_saves_keep_both_columns_sqlite() {
        race_draft_and_direct_saves(ConfigStore::new(SqliteStorage::open_in_memory().unwrap()));
    }

    #[test]
    fn test_lifecycle_on_sqlite_backend() {
        let store = ConfigStore::new(SqliteStorage::open_in_memory().unwrap());
        store
            .upsert_draft("/", "hero", Some("HeroBlock"), props(json!({"title": "Old"})))
            .unwrap();
        store.publish("/", "hero").unwrap();

        let row = store.get("/", "hero").unwrap().unwrap();
        assert!(row.is_published);
        assert_eq!(row.props, props(json!({"title": "Old"})));
        assert_eq!(store.list_by_path("/").unwrap().len(), 1);
    }
}
