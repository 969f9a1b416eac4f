//! Repository factory for runtime backend selection.
//!
//! `STORAGE_MODE` picks between the in-memory tables and `PostgreSQL`. The
//! factory opens the pool and applies migrations before handing out
//! repositories, so a server never starts against an outdated schema.
//!
//! # Example
//!
//! ```ignore
//! let factory = RepositoryFactory::new(config.storage.clone());
//! let repositories = factory.create().await?;
//! let movies = ConcurrencyGuardedStore::new(repositories.movies.clone());
//! ```

use std::str::FromStr;
use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;

use super::postgres::{self, PoolSettings};
use super::{
    InMemoryMovieRepository, InMemoryUserRepository, MovieRepository, PostgresMovieRepository,
    PostgresUserRepository, VersionedStore,
};
use crate::domain::User;

// =============================================================================
// Configuration Types
// =============================================================================

/// Storage backend for movies and users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Process-local tables. Data is lost on restart.
    #[default]
    InMemory,
    /// `PostgreSQL` storage for production use.
    Postgres,
}

impl FromStr for StorageMode {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            _ => Err(ConfigurationError::InvalidStorageMode(value.to_string())),
        }
    }
}

/// Settings consumed by [`RepositoryFactory`].
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub mode: StorageMode,
    /// Required when `mode` is [`StorageMode::Postgres`].
    pub database: Option<PoolSettings>,
}

impl StorageConfig {
    /// In-memory storage, no database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingDatabaseUrl`] when postgres mode
    /// has no usable database URL.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let has_url = self
            .database
            .as_ref()
            .is_some_and(|settings| !settings.url.trim().is_empty());
        if self.mode == StorageMode::Postgres && !has_url {
            return Err(ConfigurationError::MissingDatabaseUrl);
        }
        Ok(())
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Invalid storage configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid storage mode: '{0}'. Expected 'in_memory' or 'postgres'")]
    InvalidStorageMode(String),

    #[error("DATABASE_URL environment variable is required when STORAGE_MODE=postgres")]
    MissingDatabaseUrl,
}

/// Errors that can occur during factory initialization.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Database connection error: {0}")]
    DatabaseConnection(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

// =============================================================================
// Repository Factory
// =============================================================================

/// Collection of initialized repositories.
#[derive(Clone)]
pub struct Repositories {
    pub movies: Arc<dyn MovieRepository>,
    pub users: Arc<dyn VersionedStore<User>>,
    /// The pool behind the repositories, closed during shutdown.
    pub pool: Option<PgPool>,
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Repositories")
            .field("movies", &"Arc<dyn MovieRepository>")
            .field("users", &"Arc<dyn VersionedStore<User>>")
            .field("pool", &self.pool.is_some())
            .finish()
    }
}

impl Repositories {
    /// Fresh in-memory repositories.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            movies: Arc::new(InMemoryMovieRepository::new()),
            users: Arc::new(InMemoryUserRepository::new()),
            pool: None,
        }
    }

    fn postgres(pool: PgPool) -> Self {
        Self {
            movies: Arc::new(PostgresMovieRepository::new(pool.clone())),
            users: Arc::new(PostgresUserRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }
}

/// Creates repositories for the configured backend.
#[derive(Debug, Clone)]
pub struct RepositoryFactory {
    config: StorageConfig,
}

impl RepositoryFactory {
    #[must_use]
    pub const fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Creates all repositories based on the configuration.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError` if the configuration is invalid, the database
    /// is unreachable or a migration fails.
    pub async fn create(&self) -> Result<Repositories, FactoryError> {
        self.config.validate()?;

        match self.config.mode {
            StorageMode::InMemory => {
                tracing::info!("Using in-memory storage");
                Ok(Repositories::in_memory())
            }
            StorageMode::Postgres => {
                let settings = self
                    .config
                    .database
                    .as_ref()
                    .ok_or(ConfigurationError::MissingDatabaseUrl)?;

                let pool = postgres::connect(settings)
                    .await
                    .map_err(|error| FactoryError::DatabaseConnection(error.to_string()))?;
                tracing::info!(
                    max_connections = settings.max_connections,
                    "Database connection pool established"
                );

                postgres::run_migrations(&pool)
                    .await
                    .map_err(|error| FactoryError::Migration(error.to_string()))?;
                tracing::info!("Database migrations applied");

                Ok(Repositories::postgres(pool))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
