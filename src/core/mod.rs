//! Core system types and foundations
//!
//! Row and layout types, the error taxonomy, configuration, application
//! state and its factory, and tracing setup.

pub mod app_state;
pub mod config;
pub mod error;
pub mod factory;
pub mod logging;
pub mod types;

// Re-export commonly used items
pub use app_state::AppState;
pub use config::Config;
pub use error::{Error, Result, StoreError};
pub use factory::{create_app_state, ConfiguredAppState};
pub use types::{BlockConfig, BlockKey, Layout, Props, ResolvedBlock};
