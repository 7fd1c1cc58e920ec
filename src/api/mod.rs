//! # API Module
//!
//! HTTP interface of the block configuration service.
//!
//! ## Endpoints Overview
//!
//! ### Layout
//! - `GET /layout?path=&draft=0|1` - Ordered blocks of a page (draft needs a session)
//! - `POST /layout` - Same, with `{path, draft, defaults}` where `defaults` maps a
//!   block type to props merged under the stored ones
//!
//! ### Lifecycle (admin)
//! - `POST /draft` - Save unpublished props
//! - `POST /publish` - Promote a block's draft to live
//! - `POST /save` - Write live props directly
//! - `POST /publish-page` - Publish every drafted block of a page
//! - `GET /state?path=&id=` - Lifecycle state of a block
//!
//! ### Bulk transfer (admin)
//! - `GET /export?path=` - Dump rows of a page or of the whole store
//! - `POST /import` - Upsert rows
//!
//! ### Sessions
//! - `POST /admin/login` - Exchange the admin password for a session cookie
//! - `POST /admin/logout` - Drop the session
//!
//! ### System
//! - `GET /health`, `GET /info`, `GET /metrics`

pub mod error;
pub mod extract;
pub mod handlers;
pub mod server;

// Re-export commonly used items
pub use error::{ApiError, ErrorResponse};
pub use server::{create_app, start_server};
