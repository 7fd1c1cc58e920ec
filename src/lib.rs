//! Studio Blocks - page block configuration service
//!
//! Stores per-page block configuration for a marketing site, with a
//! draft/publish lifecycle so editors can preview changes before they go
//! live, and resolves the ordered layout of a page for rendering.
#![warn(missing_docs)]

// Core foundational modules
pub mod core;

// Main functional modules
pub mod api;
pub mod layout;
pub mod lifecycle;
pub mod merge;
pub mod security;
pub mod storage;
pub mod system;

// Re-export commonly used items for convenience
pub use self::core::{Config, Error, Result};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize tracing and the metrics registry
pub fn init(config: &Config) -> Result<()> {
    self::core::logging::init(&config.logging);

    tracing::info!("Initializing {} v{}", NAME, VERSION);

    system::metrics::init_registry();

    Ok(())
}
