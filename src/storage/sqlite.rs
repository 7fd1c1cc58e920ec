//! SQLite storage backend
//!
//! One `block_configs` table keyed by `(path, block_id)`. Property bags are
//! stored as JSON text. Upserts use `ON CONFLICT DO UPDATE`, which keeps the
//! original rowid, so `ORDER BY rowid` is first-insert order.
//!
//! `update` reads and rewrites a row inside one `BEGIN IMMEDIATE`
//! transaction while holding the connection mutex, which also keeps other
//! processes sharing the file from interleaving a write.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use crate::core::error::StoreError;
use crate::core::types::{BlockConfig, BlockKey, Props};
use crate::storage::BlockStorage;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS block_configs (
    path          TEXT    NOT NULL,
    block_id      TEXT    NOT NULL,
    block_type    TEXT    NOT NULL DEFAULT '',
    props         TEXT    NOT NULL DEFAULT '{}',
    draft_props   TEXT,
    is_published  INTEGER NOT NULL DEFAULT 0,
    updated_at_ms INTEGER NOT NULL,
    PRIMARY KEY (path, block_id)
);
CREATE INDEX IF NOT EXISTS block_configs_path ON block_configs(path);
"#;

const SELECT_COLUMNS: &str =
    "SELECT path, block_id, block_type, props, draft_props, is_published, updated_at_ms FROM block_configs";

/// SQLite-backed storage
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database file and install the schema
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_rows(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<BlockConfig>, StoreError> {
        let conn = self.conn.lock();
        select_rows(&conn, sql, params)
    }
}

fn select_rows(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<BlockConfig>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(decode_row(row)?);
    }
    Ok(out)
}

fn select_one(conn: &Connection, key: &BlockKey) -> Result<Option<BlockConfig>, StoreError> {
    let sql = format!("{} WHERE path=?1 AND block_id=?2", SELECT_COLUMNS);
    let rows = select_rows(conn, &sql, params![key.path, key.block_id])?;
    Ok(rows.into_iter().next())
}

fn upsert_row(conn: &Connection, row: &BlockConfig) -> Result<(), StoreError> {
    let props = serde_json::to_string(&row.props)?;
    let draft_props = row
        .draft_props
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        r#"
        INSERT INTO block_configs(path, block_id, block_type, props, draft_props, is_published, updated_at_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(path, block_id) DO UPDATE SET
          block_type=excluded.block_type,
          props=excluded.props,
          draft_props=excluded.draft_props,
          is_published=excluded.is_published,
          updated_at_ms=excluded.updated_at_ms
        "#,
        params![
            row.path,
            row.block_id,
            row.block_type,
            props,
            draft_props,
            row.is_published,
            row.updated_at.timestamp_millis(),
        ],
    )?;
    Ok(())
}

fn decode_props(text: &str) -> Result<Props, StoreError> {
    Ok(serde_json::from_str(text)?)
}

fn decode_row(row: &Row<'_>) -> Result<BlockConfig, StoreError> {
    let props: String = row.get(3)?;
    let draft_props: Option<String> = row.get(4)?;
    let updated_at_ms: i64 = row.get(6)?;

    Ok(BlockConfig {
        path: row.get(0)?,
        block_id: row.get(1)?,
        block_type: row.get(2)?,
        props: decode_props(&props)?,
        draft_props: draft_props.as_deref().map(decode_props).transpose()?,
        is_published: row.get(5)?,
        updated_at: DateTime::<Utc>::from_timestamp_millis(updated_at_ms)
            .ok_or_else(|| StoreError::Backend(format!("invalid timestamp {}", updated_at_ms)))?,
    })
}

impl BlockStorage for SqliteStorage {
    fn get(&self, key: &BlockKey) -> Result<Option<BlockConfig>, StoreError> {
        let conn = self.conn.lock();
        select_one(&conn, key)
    }

    fn put(&self, row: BlockConfig) -> Result<(), StoreError> {
        tracing::debug!("SqliteStorage::put {}#{}", row.path, row.block_id);
        let conn = self.conn.lock();
        upsert_row(&conn, &row)
    }

    fn update(
        &self,
        key: &BlockKey,
        apply: &mut dyn FnMut(&mut BlockConfig),
    ) -> Result<BlockConfig, StoreError> {
        tracing::debug!("SqliteStorage::update {}", key);
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut row = select_one(&tx, key)?.unwrap_or_else(|| BlockConfig::empty(key));
        apply(&mut row);
        upsert_row(&tx, &row)?;

        tx.commit()?;
        Ok(row)
    }

    fn list_by_path(&self, path: &str) -> Result<Vec<BlockConfig>, StoreError> {
        let sql = format!("{} WHERE path=?1 ORDER BY rowid ASC", SELECT_COLUMNS);
        self.query_rows(&sql, params![path])
    }

    fn list_all(&self) -> Result<Vec<BlockConfig>, StoreError> {
        let sql = format!("{} ORDER BY path ASC, rowid ASC", SELECT_COLUMNS);
        self.query_rows(&sql, [])
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM block_configs", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|_| StoreError::Backend("negative row count".into()))
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
