//! Repository traits for domain entities.
//!
//! Backing stores expose one atomic conditional update per entity kind. The
//! check of the expected version and the write happen in a single storage
//! operation; callers never compare versions themselves.

use futures::future::BoxFuture;
use thiserror::Error;

use crate::domain::{Movie, MovieQuery, VersionedEntity};

// =============================================================================
// Repository Error
// =============================================================================

/// Errors that can occur during repository operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// A unique constraint rejected the write.
    #[error("Duplicate value for {0}")]
    UniqueViolation(String),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored row could not be turned back into a domain value.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        if let Some(database_error) = error.as_database_error()
            && database_error.is_unique_violation()
        {
            let constraint = database_error.constraint().unwrap_or("unique").to_string();
            return Self::UniqueViolation(constraint);
        }
        Self::DatabaseError(error.to_string())
    }
}

// =============================================================================
// Conditional Update
// =============================================================================

/// Outcome of a version-checked write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalUpdate {
    /// The stored version matched and the row now carries `version`.
    Applied { version: i32 },
    /// The row exists but is at `current`, not the expected version.
    VersionMismatch { current: i32 },
    /// No row has the requested id.
    Missing,
}

// =============================================================================
// Pagination
// =============================================================================

/// One page of results plus the number of matches across all pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> PaginatedResult<T> {
    /// Creates a new paginated result.
    #[must_use]
    pub const fn new(items: Vec<T>, total: u64) -> Self {
        Self { items, total }
    }
}

// =============================================================================
// Versioned Store
// =============================================================================

/// Storage operations shared by every versioned entity.
pub trait VersionedStore<E: VersionedEntity>: Send + Sync {
    /// Inserts a new entity at the initial version.
    fn insert(&self, draft: E::Draft) -> BoxFuture<'_, Result<E, RepositoryError>>;

    /// Loads an entity, `Ok(None)` if absent.
    fn get_by_id(&self, id: E::Id) -> BoxFuture<'_, Result<Option<E>, RepositoryError>>;

    /// Writes `changes` and bumps the version, only if the stored version
    /// equals `expected_version`.
    fn conditional_update(
        &self,
        id: E::Id,
        expected_version: i32,
        changes: E::Changes,
    ) -> BoxFuture<'_, Result<ConditionalUpdate, RepositoryError>>;

    /// Removes an entity regardless of version. Returns false if absent.
    fn delete(&self, id: E::Id) -> BoxFuture<'_, Result<bool, RepositoryError>>;
}

/// Movie storage.
pub trait MovieRepository: VersionedStore<Movie> {
    /// Lists movies matching `query`, sorted and paginated.
    fn list(&self, query: MovieQuery) -> BoxFuture<'_, Result<PaginatedResult<Movie>, RepositoryError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_row_not_found_maps_to_database_error() {
        let error: RepositoryError = sqlx::Error::RowNotFound.into();
        assert!(matches!(error, RepositoryError::DatabaseError(_)));
    }
}
