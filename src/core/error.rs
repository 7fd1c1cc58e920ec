//! Error types and handling for the block configuration service
//!
//! Every failure that can reach a request boundary is one of the kinds
//! below. Store failures are wrapped, never passed through raw.

use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed required field
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing, expired or invalid admin session
    #[error("Authentication required: {0}")]
    Auth(String),

    /// Caller exceeded its request budget for the current window
    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the window resets
        retry_after_secs: u64,
    },

    /// Requested path or block has no stored configuration
    #[error("Not found: {0}")]
    NotFound(String),

    /// Underlying storage failure
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Storage backend errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored props could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure while opening the store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// HTTP status code this error maps to
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Auth(_) => 401,
            Error::NotFound(_) => 404,
            Error::RateLimited { .. } => 429,
            Error::Store(_) | Error::Config(_) => 500,
        }
    }

    /// Check if this is a client error (4xx equivalent)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx equivalent)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Whether resubmitting the same request may succeed.
    /// Nothing here retries automatically; this only informs callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. }
                | Error::Store(StoreError::Sqlite(_))
                | Error::Store(StoreError::Io(_))
                | Error::Store(StoreError::Backend(_))
        )
    }
}
