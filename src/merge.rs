//! Override merge for block properties
//!
//! Stored overrides replace compiled-in defaults one top-level key at a
//! time. Nested values are never merged: an override of `{"stats": []}`
//! replaces the whole `stats` default.
//!
//! The layout resolver applies this when a caller supplies per-type
//! defaults (`POST /layout`).

use crate::core::types::Props;

/// Combine a block's default props with an optional stored override.
///
/// Keys present in `override_props` win; keys missing from it keep their
/// default. An empty override returns the defaults unchanged.
pub fn merge_props(defaults: &Props, override_props: Option<&Props>) -> Props {
    let mut merged = defaults.clone();
    if let Some(override_props) = override_props {
        for (key, value) in override_props {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
