//! Core data types for block configuration
//!
//! A page is a path plus an ordered set of blocks. Each block instance is a
//! `BlockConfig` row keyed by `(path, block_id)` carrying both the live
//! (`props`) and pending (`draft_props`) property bags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Open-ended block property bag. Validated per block type at render time only.
pub type Props = Map<String, Value>;

/// Property key holding the explicit layout order of a block
pub const ORDER_KEY: &str = "order_index";

/// Composite primary key of a block configuration row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockKey {
    /// Page route the block belongs to
    pub path: String,
    /// Block instance identifier, unique within the page
    pub block_id: String,
}

impl BlockKey {
    /// Create a key from any string-like parts
    pub fn new(path: impl Into<String>, block_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            block_id: block_id.into(),
        }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.path, self.block_id)
    }
}

/// One stored block configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    /// Page route
    pub path: String,
    /// Block instance identifier
    pub block_id: String,
    /// Which block implementation renders this config (e.g. "HeroBlock")
    #[serde(default)]
    pub block_type: String,
    /// Published (live) properties
    #[serde(default)]
    pub props: Props,
    /// Unpublished edits; `None` means no pending draft
    #[serde(default)]
    pub draft_props: Option<Props>,
    /// Whether `props` has ever been published
    #[serde(default)]
    pub is_published: bool,
    /// Time of last write
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl BlockConfig {
    /// Create an empty, unpublished row for the given key
    pub fn empty(key: &BlockKey) -> Self {
        Self {
            path: key.path.clone(),
            block_id: key.block_id.clone(),
            block_type: String::new(),
            props: Props::new(),
            draft_props: None,
            is_published: false,
            updated_at: Utc::now(),
        }
    }

    /// Key of this row
    pub fn key(&self) -> BlockKey {
        BlockKey::new(self.path.clone(), self.block_id.clone())
    }

    /// Whether the row contributes anything to the live page
    pub fn is_live(&self) -> bool {
        self.is_published && !self.props.is_empty()
    }
}

/// A block as it should be rendered, after draft/published selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBlock {
    /// Block instance identifier
    pub block_id: String,
    /// Block implementation name
    pub block_type: String,
    /// Properties to render
    pub effective_props: Props,
}

/// Resolved, ordered layout of a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    /// Page route
    pub path: String,
    /// Blocks in render order
    pub blocks: Vec<ResolvedBlock>,
}

/// Read the numeric order key from a property bag, if present
pub fn order_of(props: &Props) -> Option<f64> {
    props.get(ORDER_KEY).and_then(Value::as_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Props {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_empty_row_is_not_live() {
        let row = BlockConfig::empty(&BlockKey::new("/", "hero-1"));
        assert!(!row.is_live());
        assert!(row.draft_props.is_none());
        assert_eq!(row.key(), BlockKey::new("/", "hero-1"));
    }

    #[test]
    fn test_published_empty_props_is_not_live() {
        let mut row = BlockConfig::empty(&BlockKey::new("/", "hero-1"));
        row.is_published = true;
        assert!(!row.is_live());

        row.props = props(json!({"title": "Hi"}));
        assert!(row.is_live());
    }

    #[test]
    fn test_order_of_accepts_integers_and_floats() {
        assert_eq!(order_of(&props(json!({"order_index": 3}))), Some(3.0));
        assert_eq!(order_of(&props(json!({"order_index": 1.5}))), Some(1.5));
        assert_eq!(order_of(&props(json!({"order_index": "2"}))), None);
        assert_eq!(order_of(&Props::new()), None);
    }

    #[test]
    fn test_deserialize_with_missing_optional_fields() {
        let row: BlockConfig =
            serde_json::from_value(json!({"path": "/about", "block_id": "intro"})).unwrap();
        assert_eq!(row.block_type, "");
        assert!(row.props.is_empty());
        assert!(!row.is_published);
    }
}
