//! Application State Management
//!
//! `AppState` holds every service a request handler needs. It is generic
//! over the storage backend; the factory picks the concrete type at startup.

use std::sync::Arc;

use crate::core::config::Config;
use crate::security::{RateLimiter, SessionStore};
use crate::storage::{ConfigStore, StorageImpl};

/// Central application state holding all services and components
pub struct AppState<S: StorageImpl> {
    /// Block configuration store
    pub store: ConfigStore<S>,

    /// Application configuration
    pub config: Arc<Config>,

    /// Admin session table
    pub sessions: Arc<SessionStore>,

    /// Per-client limiter for admin endpoints
    pub limiter: Arc<RateLimiter>,
}

// Manual Clone so S itself need not be Clone; every field is shared.
impl<S: StorageImpl> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            sessions: self.sessions.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

impl<S: StorageImpl> AppState<S> {
    /// Build the state around an already opened backend
    pub fn new(backend: S, config: Config) -> Self {
        let sessions = SessionStore::new(&config.admin);
        let limiter = RateLimiter::new(&config.rate_limit);
        Self {
            store: ConfigStore::new(backend),
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            limiter: Arc::new(limiter),
        }
    }
}
