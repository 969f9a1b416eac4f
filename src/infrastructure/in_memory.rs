//! In-memory repository implementations.
//!
//! Tables are `BTreeMap`s behind `Arc<tokio::sync::RwLock<...>>`. The
//! version comparison and the write of a conditional update happen under
//! the same write guard, which gives the same atomicity as the single
//! `UPDATE ... WHERE version = $n` used by the `PostgreSQL` backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::domain::{
    Movie, MovieChanges, MovieId, MovieQuery, NewMovie, NewUser, User, UserChanges, UserId,
    VersionedEntity,
};

use super::repository::{
    ConditionalUpdate, MovieRepository, PaginatedResult, RepositoryError, VersionedStore,
};

// =============================================================================
// Table
// =============================================================================

#[derive(Debug)]
struct Table<E: VersionedEntity> {
    rows: BTreeMap<E::Id, E>,
    last_id: i64,
}

impl<E: VersionedEntity> Table<E> {
    const fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            last_id: 0,
        }
    }

    const fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn conditional_update(
        &mut self,
        id: E::Id,
        expected_version: i32,
        changes: &E::Changes,
    ) -> ConditionalUpdate {
        match self.rows.get_mut(&id) {
            None => ConditionalUpdate::Missing,
            Some(row) if row.version() != expected_version => ConditionalUpdate::VersionMismatch {
                current: row.version(),
            },
            Some(row) => {
                let version = expected_version + 1;
                row.apply(changes, version);
                ConditionalUpdate::Applied { version }
            }
        }
    }
}

// =============================================================================
// In-Memory Movie Repository
// =============================================================================

/// In-memory implementation of [`MovieRepository`].
#[derive(Debug, Clone)]
pub struct InMemoryMovieRepository {
    table: Arc<RwLock<Table<Movie>>>,
}

impl InMemoryMovieRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(Table::new())),
        }
    }
}

impl Default for InMemoryMovieRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionedStore<Movie> for InMemoryMovieRepository {
    fn insert(&self, draft: NewMovie) -> BoxFuture<'_, Result<Movie, RepositoryError>> {
        Box::pin(async move {
            let mut table = self.table.write().await;
            let id = MovieId::new(table.next_id());
            let movie = Movie::from_new(id, Utc::now(), draft);
            table.rows.insert(id, movie.clone());
            Ok(movie)
        })
    }

    fn get_by_id(&self, id: MovieId) -> BoxFuture<'_, Result<Option<Movie>, RepositoryError>> {
        Box::pin(async move { Ok(self.table.read().await.rows.get(&id).cloned()) })
    }

    fn conditional_update(
        &self,
        id: MovieId,
        expected_version: i32,
        changes: MovieChanges,
    ) -> BoxFuture<'_, Result<ConditionalUpdate, RepositoryError>> {
        Box::pin(async move {
            let mut table = self.table.write().await;
            Ok(table.conditional_update(id, expected_version, &changes))
        })
    }

    fn delete(&self, id: MovieId) -> BoxFuture<'_, Result<bool, RepositoryError>> {
        Box::pin(async move { Ok(self.table.write().await.rows.remove(&id).is_some()) })
    }
}

impl MovieRepository for InMemoryMovieRepository {
    fn list(
        &self,
        query: MovieQuery,
    ) -> BoxFuture<'_, Result<PaginatedResult<Movie>, RepositoryError>> {
        Box::pin(async move {
            let table = self.table.read().await;
            let mut matches: Vec<&Movie> = table
                .rows
                .values()
                .filter(|movie| query.matches(movie))
                .collect();
            matches.sort_by(|left, right| query.filters.sort.compare(left, right));

            let total = matches.len() as u64;
            let offset = usize::try_from(query.filters.offset()).unwrap_or(usize::MAX);
            let items = matches
                .into_iter()
                .skip(offset)
                .take(query.filters.limit() as usize)
                .cloned()
                .collect();

            Ok(PaginatedResult::new(items, total))
        })
    }
}

// =============================================================================
// In-Memory User Repository
// =============================================================================

/// In-memory user table.
///
/// Emails are unique, compared case-insensitively.
#[derive(Debug, Clone)]
pub struct InMemoryUserRepository {
    table: Arc<RwLock<Table<User>>>,
}

impl InMemoryUserRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(Table::new())),
        }
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn email_taken(table: &Table<User>, email: &str, except: Option<UserId>) -> bool {
    table
        .rows
        .values()
        .any(|user| Some(user.id) != except && user.email.eq_ignore_ascii_case(email))
}

const EMAIL_CONSTRAINT: &str = "users_email_key";

impl VersionedStore<User> for InMemoryUserRepository {
    fn insert(&self, draft: NewUser) -> BoxFuture<'_, Result<User, RepositoryError>> {
        Box::pin(async move {
            let mut table = self.table.write().await;
            if email_taken(&table, &draft.email, None) {
                return Err(RepositoryError::UniqueViolation(EMAIL_CONSTRAINT.to_string()));
            }
            let id = UserId::new(table.next_id());
            let user = User::from_new(id, Utc::now(), draft);
            table.rows.insert(id, user.clone());
            Ok(user)
        })
    }

    fn get_by_id(&self, id: UserId) -> BoxFuture<'_, Result<Option<User>, RepositoryError>> {
        Box::pin(async move { Ok(self.table.read().await.rows.get(&id).cloned()) })
    }

    fn conditional_update(
        &self,
        id: UserId,
        expected_version: i32,
        changes: UserChanges,
    ) -> BoxFuture<'_, Result<ConditionalUpdate, RepositoryError>> {
        Box::pin(async move {
            let mut table = self.table.write().await;
            if let Some(email) = &changes.email
                && table.rows.contains_key(&id)
                && email_taken(&table, email, Some(id))
            {
                return Err(RepositoryError::UniqueViolation(EMAIL_CONSTRAINT.to_string()));
            }
            Ok(table.conditional_update(id, expected_version, &changes))
        })
    }

    fn delete(&self, id: UserId) -> BoxFuture<'_, Result<bool, RepositoryError>> {
        Box::pin(async move { Ok(self.table.write().await.rows.remove(&id).is_some()) })
    }
}

// =============================================================================
// Tests
// =============================================================================
