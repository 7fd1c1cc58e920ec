//! Application Factory
//!
//! Opens the configured backend and wraps it in an [`AppState`]. The enum
//! lets `main` hold either concrete state and match once at startup.

use crate::core::app_state::AppState;
use crate::core::config::{Config, StorageType};
use crate::core::error::Result;
use crate::storage::{MemoryStorage, SqliteStorage};

/// AppState with its storage backend resolved
pub enum ConfiguredAppState {
    /// In-memory backend
    Memory {
        /// The application state
        app_state: AppState<MemoryStorage>,
    },
    /// SQLite backend
    Sqlite {
        /// The application state
        app_state: AppState<SqliteStorage>,
    },
}

impl ConfiguredAppState {
    /// Get the HTTP address from config
    pub fn http_addr(&self) -> std::net::SocketAddr {
        match self {
            ConfiguredAppState::Memory { app_state } => app_state.config.server.http_addr,
            ConfiguredAppState::Sqlite { app_state } => app_state.config.server.http_addr,
        }
    }

    /// Name of the selected backend
    pub fn backend_name(&self) -> &'static str {
        match self {
            ConfiguredAppState::Memory { .. } => "memory",
            ConfiguredAppState::Sqlite { .. } => "sqlite",
        }
    }
}

/// Create AppState based on configuration
pub fn create_app_state(config: Config) -> Result<ConfiguredAppState> {
    tracing::info!(
        "Creating AppState with storage type: {:?}",
        config.storage.storage_type
    );

    match config.storage.storage_type {
        StorageType::Memory => {
            let app_state = AppState::new(MemoryStorage::new(), config);
            tracing::info!("Memory storage initialized");
            Ok(ConfiguredAppState::Memory { app_state })
        }
        StorageType::Sqlite => {
            let db_path = config.storage.database_path();
            let backend = SqliteStorage::open(&db_path)?;
            tracing::info!("SQLite storage opened at {:?}", db_path);
            let app_state = AppState::new(backend, config);
            Ok(ConfiguredAppState::Sqlite { app_state })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_state_creation() {
        let configured = create_app_state(Config::default()).unwrap();
        assert_eq!(configured.backend_name(), "memory");
        match configured {
            ConfiguredAppState::Memory { app_state } => {
                assert_eq!(app_state.store.count().unwrap(), 0);
            }
            ConfiguredAppState::Sqlite { .. } => panic!("expected memory backend"),
        }
    }

    #[test]
    fn test_sqlite_state_creation() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.storage_type = StorageType::Sqlite;
        config.storage.data_dir = dir.path().join("nested");

        let configured = create_app_state(config).unwrap();
        assert_eq!(configured.backend_name(), "sqlite");
        assert!(dir.path().join("nested").exists());
    }
}
