//! Draft/publish lifecycle per `(path, block_id)`
//!
//! ```text
//! Unconfigured --save_draft--> Drafted --publish--> Published
//!                                 ^                     |
//!                                 +----save_draft-------+
//! Published --save_direct--> Published
//! ```
//!
//! A published block that receives a new draft keeps serving its last
//! published props until the next publish. Nothing here deletes rows.
//! Publishing retains the draft, so right after a publish the draft equals
//! the live props.

use serde::Serialize;

use crate::core::error::Result;
use crate::core::types::{BlockConfig, Props};
use crate::storage::{ConfigStore, StorageImpl};

/// Where a block sits in the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockState {
    /// No row stored
    Unconfigured,
    /// Row exists but has never been published
    Drafted,
    /// Live props are being served
    Published,
}

/// State of a block plus whether its draft differs from what is live
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateReport {
    /// Lifecycle state
    pub state: BlockState,
    /// Draft exists and differs from the live props
    pub has_pending_changes: bool,
}

impl BlockState {
    /// Classify a stored row
    pub fn of(row: Option<&BlockConfig>) -> Self {
        match row {
            None => BlockState::Unconfigured,
            Some(row) if row.is_published => BlockState::Published,
            Some(_) => BlockState::Drafted,
        }
    }
}

impl StateReport {
    /// Build the report for a stored row
    pub fn of(row: Option<&BlockConfig>) -> Self {
        let state = BlockState::of(row);
        let has_pending_changes = match row {
            None => false,
            Some(row) => match (&row.draft_props, state) {
                (None, _) => false,
                (Some(_), BlockState::Drafted) => true,
                (Some(draft), _) => draft != &row.props,
            },
        };
        Self {
            state,
            has_pending_changes,
        }
    }
}

/// Result of publishing every block of a page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PagePublishReport {
    /// Block ids that were published
    pub published: Vec<String>,
    /// Block ids with no draft, left exactly as they were. These are
    /// typically blocks saved directly to live.
    pub unchanged: Vec<String>,
    /// Block ids that failed, with the error message
    pub failed: Vec<(String, String)>,
}

/// Lifecycle operations over a config store
pub struct Lifecycle<'a, S: StorageImpl> {
    store: &'a ConfigStore<S>,
}

impl<'a, S: StorageImpl> Lifecycle<'a, S> {
    /// Bind to a store
    pub fn new(store: &'a ConfigStore<S>) -> Self {
        Self { store }
    }

    /// Current state of a block
    pub fn state(&self, path: &str, block_id: &str) -> Result<StateReport> {
        let row = self.store.get(path, block_id)?;
        Ok(StateReport::of(row.as_ref()))
    }

    /// Record a new draft without touching the live props
    pub fn save_draft(
        &self,
        path: &str,
        block_id: &str,
        block_type: Option<&str>,
        props: Props,
    ) -> Result<BlockConfig> {
        let row = self.store.upsert_draft(path, block_id, block_type, props)?;
        tracing::info!(path = %row.path, block_id = %row.block_id, "Draft saved");
        Ok(row)
    }

    /// Promote the draft to live
    pub fn publish(&self, path: &str, block_id: &str) -> Result<BlockConfig> {
        let row = self.store.publish(path, block_id)?;
        tracing::info!(path = %row.path, block_id = %row.block_id, "Block published");
        Ok(row)
    }

    /// Write live props directly, for editors without a preview step
    pub fn save_direct(
        &self,
        path: &str,
        block_id: &str,
        block_type: Option<&str>,
        props: Props,
    ) -> Result<BlockConfig> {
        let row = self.store.upsert_published(path, block_id, block_type, props)?;
        tracing::info!(path = %row.path, block_id = %row.block_id, "Block saved directly");
        Ok(row)
    }

    /// Publish every drafted block stored for a page, one key at a time.
    /// Rows without a draft are skipped so their live props survive.
    /// Failures are collected, not rolled back.
    pub fn publish_page(&self, path: &str) -> Result<PagePublishReport> {
        let rows = self.store.list_by_path(path)?;
        let mut report = PagePublishReport::default();

        for row in rows {
            if row.draft_props.is_none() {
                report.unchanged.push(row.block_id);
                continue;
            }
            match self.store.publish(&row.path, &row.block_id) {
                Ok(_) => report.published.push(row.block_id),
                Err(e) => {
                    tracing::warn!("Publish failed for {}#{}: {}", row.path, row.block_id, e);
                    report.failed.push((row.block_id, e.to_string()));
                }
            }
        }

        tracing::info!(
            "Published page {}: {} ok, {} unchanged, {} failed",
            path,
            report.published.len(),
            report.unchanged.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
