//! Optimistic concurrency over a versioned backing store.
//!
//! [`ConcurrencyGuardedStore`] is the only write path for versioned
//! entities. Callers read an entity, change a local copy and hand both the
//! copy and the change set to [`ConcurrencyGuardedStore::update`]. The
//! backing store applies the change only if the stored version still equals
//! the copy's version; otherwise the caller receives
//! [`StoreError::Conflict`] and must re-read before trying again.
//!
//! Among N concurrent updates issued against the same version at most one
//! succeeds.

use std::sync::Arc;

use thiserror::Error;

use crate::domain::VersionedEntity;

use super::repository::{ConditionalUpdate, RepositoryError, VersionedStore};

/// Outcome of a guarded store operation other than success.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The entity changed since it was read.
    #[error("{kind} {id} was modified concurrently (expected version {expected}, now {current})")]
    Conflict {
        kind: &'static str,
        id: String,
        expected: i32,
        current: i32,
    },

    /// No entity has the requested id.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// A unique constraint rejected the write.
    #[error("{kind} violates unique constraint {constraint}")]
    Duplicate {
        kind: &'static str,
        constraint: String,
    },

    /// The backing store failed.
    #[error("store unavailable: {0}")]
    Unavailable(#[source] RepositoryError),
}

impl StoreError {
    fn from_repository<E: VersionedEntity>(error: RepositoryError) -> Self {
        match error {
            RepositoryError::UniqueViolation(constraint) => Self::Duplicate {
                kind: E::KIND,
                constraint,
            },
            other => Self::Unavailable(other),
        }
    }

    fn not_found<E: VersionedEntity>(id: E::Id) -> Self {
        Self::NotFound {
            kind: E::KIND,
            id: id.to_string(),
        }
    }
}

/// Version-checked access to a backing store.
pub struct ConcurrencyGuardedStore<E: VersionedEntity> {
    backing: Arc<dyn VersionedStore<E>>,
}

impl<E: VersionedEntity> Clone for ConcurrencyGuardedStore<E> {
    fn clone(&self) -> Self {
        Self {
            backing: Arc::clone(&self.backing),
        }
    }
}

impl<E: VersionedEntity> std::fmt::Debug for ConcurrencyGuardedStore<E> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ConcurrencyGuardedStore")
            .field("kind", &E::KIND)
            .finish_non_exhaustive()
    }
}

impl<E: VersionedEntity> ConcurrencyGuardedStore<E> {
    /// Wraps a backing store.
    #[must_use]
    pub fn new(backing: Arc<dyn VersionedStore<E>>) -> Self {
        Self { backing }
    }

    /// Inserts a new entity at version 1. No version check applies.
    ///
    /// # Errors
    ///
    /// [`StoreError::Duplicate`] on a unique violation, otherwise
    /// [`StoreError::Unavailable`].
    pub async fn insert(&self, draft: E::Draft) -> Result<E, StoreError> {
        self.backing
            .insert(draft)
            .await
            .map_err(StoreError::from_repository::<E>)
    }

    /// Reads an entity.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if absent, [`StoreError::Unavailable`] if the
    /// store fails.
    pub async fn get(&self, id: E::Id) -> Result<E, StoreError> {
        self.backing
            .get_by_id(id)
            .await
            .map_err(StoreError::from_repository::<E>)?
            .ok_or_else(|| StoreError::not_found::<E>(id))
    }

    /// Applies `changes` to the stored entity if it is still at
    /// `entity.version()`.
    ///
    /// On success `entity` receives the changes and its version advances by
    /// exactly one, so the caller can keep editing without re-reading. On
    /// failure `entity` is left untouched.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`] when another writer got there first
    /// - [`StoreError::NotFound`] when the entity no longer exists
    /// - [`StoreError::Duplicate`] on a unique violation
    /// - [`StoreError::Unavailable`] when the store fails
    pub async fn update(&self, entity: &mut E, changes: E::Changes) -> Result<(), StoreError> {
        let id = entity.id();
        let expected = entity.version();

        let outcome = self
            .backing
            .conditional_update(id, expected, changes.clone())
            .await
            .map_err(StoreError::from_repository::<E>)?;

        match outcome {
            ConditionalUpdate::Applied { version } => {
                entity.apply(&changes, version);
                Ok(())
            }
            ConditionalUpdate::VersionMismatch { current } => {
                tracing::debug!(
                    kind = E::KIND,
                    %id,
                    expected,
                    current,
                    "Rejected stale update"
                );
                Err(StoreError::Conflict {
                    kind: E::KIND,
                    id: id.to_string(),
                    expected,
                    current,
                })
            }
            ConditionalUpdate::Missing => Err(StoreError::not_found::<E>(id)),
        }
    }

    /// Deletes an entity regardless of its version.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if nothing matched, [`StoreError::Unavailable`]
    /// if the store fails.
    pub async fn delete(&self, id: E::Id) -> Result<(), StoreError> {
        let removed = self
            .backing
            .delete(id)
            .await
            .map_err(StoreError::from_repository::<E>)?;
        if removed {
            Ok(())
        } else {
            Err(StoreError::not_found::<E>(id))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Movie, MovieChanges, MovieId, NewMovie, Runtime};
    use crate::infrastructure::InMemoryMovieRepository;
    use futures::future::BoxFuture;
    use rstest::{fixture, rstest};

    #[fixture]
    fn store() -> ConcurrencyGuardedStore<Movie> {
        ConcurrencyGuardedStore::new(Arc::new(InMemoryMovieRepository::new()))
    }

    fn draft(title: &str) -> NewMovie {
        NewMovie {
            title: title.to_string(),
            year: 2001,
            runtime: Runtime::from_minutes(90),
            genres: vec!["drama".to_string()],
        }
    }

    fn retitle(title: &str) -> MovieChanges {
        MovieChanges {
            title: Some(title.to_string()),
            ..MovieChanges::default()
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_update_advances_local_version(store: ConcurrencyGuardedStore<Movie>) {
        let mut movie = store.insert(draft("Memento")).await.unwrap();

        store.update(&mut movie, retitle("Memento (2000)")).await.unwrap();

        assert_eq!(movie.version, 2);
        assert_eq!(movie.title, "Memento (2000)");
        let stored = store.get(movie.id).await.unwrap();
        assert_eq!(stored, movie);
    }

    #[rstest]
    #[tokio::test]
    async fn test_stale_copy_conflicts_and_is_untouched(store: ConcurrencyGuardedStore<Movie>) {
        let mut first = store.insert(draft("Memento")).await.unwrap();
        let mut stale = first.clone();

        store.update(&mut first, retitle("A")).await.unwrap();
        let result = store.update(&mut stale, retitle("B")).await;

        assert_eq!(
            result,
            Err(StoreError::Conflict {
                kind: "movie",
                id: "1".to_string(),
                expected: 1,
                current: 2,
            })
        );
        assert_eq!(stale.title, "Memento");
        assert_eq!(stale.version, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_update_of_deleted_entity_is_not_found(store: ConcurrencyGuardedStore<Movie>) {
        let mut movie = store.insert(draft("Memento")).await.unwrap();
        store.delete(movie.id).await.unwrap();

        let result = store.update(&mut movie, retitle("Gone")).await;
        assert!(matches!(result, Err(StoreError::NotFound { kind: "movie", .. })));
    }

    #[rstest]
    #[tokio::test]
    async fn test_get_and_delete_missing(store: ConcurrencyGuardedStore<Movie>) {
        let id = MovieId::new(42);
        assert!(matches!(store.get(id).await, Err(StoreError::NotFound { .. })));
        assert!(matches!(store.delete(id).await, Err(StoreError::NotFound { .. })));
    }

    #[rstest]
    #[tokio::test]
    async fn test_delete_ignores_version(store: ConcurrencyGuardedStore<Movie>) {
        let mut movie = store.insert(draft("Memento")).await.unwrap();
        store.update(&mut movie, retitle("X")).await.unwrap();
        store.update(&mut movie, retitle("Y")).await.unwrap();

        assert!(store.delete(movie.id).await.is_ok());
    }

    #[derive(Debug)]
    struct BrokenStore;

    impl VersionedStore<Movie> for BrokenStore {
        fn insert(&self, _: NewMovie) -> BoxFuture<'_, Result<Movie, RepositoryError>> {
            Box::pin(async { Err(RepositoryError::DatabaseError("down".to_string())) })
        }

        fn get_by_id(&self, _: MovieId) -> BoxFuture<'_, Result<Option<Movie>, RepositoryError>> {
            Box::pin(async { Err(RepositoryError::DatabaseError("down".to_string())) })
        }

        fn conditional_update(
            &self,
            _: MovieId,
            _: i32,
            _: MovieChanges,
        ) -> BoxFuture<'_, Result<ConditionalUpdate, RepositoryError>> {
            Box::pin(async { Err(RepositoryError::DatabaseError("down".to_string())) })
        }

        fn delete(&self, _: MovieId) -> BoxFuture<'_, Result<bool, RepositoryError>> {
            Box::pin(async { Err(RepositoryError::UniqueViolation("never".to_string())) })
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_store_failures_are_unavailable() {
        let store: ConcurrencyGuardedStore<Movie> = ConcurrencyGuardedStore::new(Arc::new(BrokenStore));
        let mut movie = Movie::from_new(MovieId::new(1), chrono::Utc::now(), draft("X"));

        assert!(matches!(
            store.update(&mut movie, retitle("Y")).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.get(movie.id).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.delete(movie.id).await,
            Err(StoreError::Duplicate { .. })
        ));
        assert_eq!(movie.version, 1);
    }
}
