//! Layout resolver
//!
//! Turns the stored rows of a page into the ordered list of blocks to
//! render, in either live or draft-preview mode.
//!
//! Ordering is by the numeric `order_index` prop of the effective props,
//! ascending. Blocks without one come after all ordered blocks. Ties are
//! broken by `block_id` so the result never depends on backend order.
//!
//! A renderer that knows its compiled-in defaults can pass them per block
//! type; stored props are then merged over them with [`merge_props`] before
//! ordering, so a default `order_index` counts when the stored props lack one.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::core::error::Result;
use crate::core::types::{order_of, BlockConfig, Layout, Props, ResolvedBlock};
use crate::merge::merge_props;
use crate::storage::{ConfigStore, StorageImpl};
use crate::system::metrics::{Metrics, Timer};

/// Default props keyed by block type
pub type BlockDefaults = HashMap<String, Props>;

/// Props a row contributes in the requested mode, or `None` when the row is
/// absent from that view.
pub fn effective_props(row: &BlockConfig, use_draft: bool) -> Option<Props> {
    if use_draft {
        Some(row.draft_props.clone().unwrap_or_else(|| row.props.clone()))
    } else if row.is_live() {
        Some(row.props.clone())
    } else {
        None
    }
}

fn compare_blocks(a: &ResolvedBlock, b: &ResolvedBlock) -> Ordering {
    let by_order = match (order_of(&a.effective_props), order_of(&b.effective_props)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_order.then_with(|| a.block_id.cmp(&b.block_id))
}

/// Resolve a layout from rows already fetched for `path`.
/// Returns `None` when there are no rows at all.
pub fn resolve_rows(path: &str, rows: Vec<BlockConfig>, use_draft: bool) -> Option<Layout> {
    resolve_rows_with_defaults(path, rows, use_draft, &BlockDefaults::new())
}

/// [`resolve_rows`] with per-type defaults under the stored props.
/// Visibility is still decided by the stored row alone.
pub fn resolve_rows_with_defaults(
    path: &str,
    rows: Vec<BlockConfig>,
    use_draft: bool,
    defaults: &BlockDefaults,
) -> Option<Layout> {
    if rows.is_empty() {
        return None;
    }

    let mut blocks: Vec<ResolvedBlock> = rows
        .into_iter()
        .filter_map(|row| {
            let stored = effective_props(&row, use_draft)?;
            let effective_props = match defaults.get(&row.block_type) {
                Some(base) => merge_props(base, Some(&stored)),
                None => stored,
            };
            Some(ResolvedBlock {
                block_id: row.block_id,
                block_type: row.block_type,
                effective_props,
            })
        })
        .collect();
    blocks.sort_by(compare_blocks);

    Some(Layout {
        path: path.to_string(),
        blocks,
    })
}

/// Fetch and resolve the layout of a page.
///
/// `Ok(None)` means the page has no stored configuration and the caller
/// should fall back to its static layout.
pub fn resolve_layout<S: StorageImpl>(
    store: &ConfigStore<S>,
    path: &str,
    use_draft: bool,
) -> Result<Option<Layout>> {
    resolve_layout_with_defaults(store, path, use_draft, &BlockDefaults::new())
}

/// [`resolve_layout`] with per-type defaults merged under the stored props
pub fn resolve_layout_with_defaults<S: StorageImpl>(
    store: &ConfigStore<S>,
    path: &str,
    use_draft: bool,
    defaults: &BlockDefaults,
) -> Result<Option<Layout>> {
    let metrics = Metrics::global();
    let timer = Timer::start(&metrics.resolve_duration);

    let rows = store.list_by_path(path)?;
    let layout = resolve_rows_with_defaults(path.trim(), rows, use_draft, defaults);

    timer.finish();
    metrics.layouts_resolved.inc();
    Ok(layout)
}
