//! `PostgreSQL` repository implementations.
//!
//! Uses `sqlx` with a shared [`PgPool`]. Schema lives in `migrations/` and
//! is applied at startup through [`run_migrations`].
//!
//! # Conditional Update
//!
//! Every versioned write is a single statement:
//!
//! ```sql
//! UPDATE movies
//! SET title = COALESCE($1, title), ..., version = version + 1
//! WHERE id = $5 AND version = $6
//! RETURNING version
//! ```
//!
//! When no row comes back, a follow-up `SELECT version` only decides whether
//! to report a version mismatch or a missing row.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::domain::{
    Movie, MovieChanges, MovieId, MovieQuery, NewMovie, NewUser, PasswordHash, Runtime, User,
    UserChanges, UserId,
};

use super::repository::{
    ConditionalUpdate, MovieRepository, PaginatedResult, RepositoryError, VersionedStore,
};

// =============================================================================
// Pool
// =============================================================================

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub url: String,
    pub max_connections: u32,
    pub max_idle_time: Duration,
    pub max_lifetime: Duration,
    pub acquire_timeout: Duration,
}

/// Opens a connection pool and verifies it with a first connection.
///
/// # Errors
///
/// Returns the `sqlx` error if the database is unreachable.
pub async fn connect(settings: &PoolSettings) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .idle_timeout(settings.max_idle_time)
        .max_lifetime(settings.max_lifetime)
        .acquire_timeout(settings.acquire_timeout)
        .connect(&settings.url)
        .await
}

/// Applies pending migrations from `migrations/`.
///
/// # Errors
///
/// Returns the migration error if any script fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct MovieRow {
    id: i64,
    created_at: DateTime<Utc>,
    title: String,
    year: i32,
    runtime: i32,
    genres: Vec<String>,
    version: i32,
}

impl From<MovieRow> for Movie {
    fn from(row: MovieRow) -> Self {
        Self {
            id: MovieId::new(row.id),
            created_at: row.created_at,
            title: row.title,
            year: row.year,
            runtime: Runtime::from_minutes(row.runtime),
            genres: row.genres,
            version: row.version,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ListedMovieRow {
    total_records: i64,
    #[sqlx(flatten)]
    movie: MovieRow,
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    created_at: DateTime<Utc>,
    name: String,
    email: String,
    password_hash: Vec<u8>,
    activated: bool,
    version: i32,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let password_hash = PasswordHash::from_bytes(row.password_hash)
            .map_err(|error| RepositoryError::SerializationError(error.to_string()))?;
        Ok(Self {
            id: UserId::new(row.id),
            created_at: row.created_at,
            name: row.name,
            email: row.email,
            password_hash,
            activated: row.activated,
            version: row.version,
        })
    }
}

fn resolve_miss(current: Option<i32>) -> ConditionalUpdate {
    current.map_or(ConditionalUpdate::Missing, |current| {
        ConditionalUpdate::VersionMismatch { current }
    })
}

// =============================================================================
// PostgreSQL Movie Repository
// =============================================================================

const MOVIE_COLUMNS: &str = "id, created_at, title, year, runtime, genres, version";

/// `PostgreSQL` implementation of [`MovieRepository`].
#[derive(Debug, Clone)]
pub struct PostgresMovieRepository {
    pool: PgPool,
}

impl PostgresMovieRepository {
    /// Creates a repository over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl VersionedStore<Movie> for PostgresMovieRepository {
    fn insert(&self, draft: NewMovie) -> BoxFuture<'_, Result<Movie, RepositoryError>> {
        Box::pin(async move {
            let row: MovieRow = sqlx::query_as(&format!(
                "INSERT INTO movies (title, year, runtime, genres) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING {MOVIE_COLUMNS}"
            ))
            .bind(&draft.title)
            .bind(draft.year)
            .bind(draft.runtime.minutes())
            .bind(&draft.genres)
            .fetch_one(&self.pool)
            .await?;
            Ok(row.into())
        })
    }

    fn get_by_id(&self, id: MovieId) -> BoxFuture<'_, Result<Option<Movie>, RepositoryError>> {
        Box::pin(async move {
            let row: Option<MovieRow> =
                sqlx::query_as(&format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1"))
                    .bind(id.value())
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row.map(Movie::from))
        })
    }

    fn conditional_update(
        &self,
        id: MovieId,
        expected_version: i32,
        changes: MovieChanges,
    ) -> BoxFuture<'_, Result<ConditionalUpdate, RepositoryError>> {
        Box::pin(async move {
            let applied: Option<i32> = sqlx::query_scalar(
                "UPDATE movies \
                 SET title = COALESCE($1, title), \
                     year = COALESCE($2, year), \
                     runtime = COALESCE($3, runtime), \
                     genres = COALESCE($4, genres), \
                     version = version + 1 \
                 WHERE id = $5 AND version = $6 \
                 RETURNING version",
            )
            .bind(changes.title)
            .bind(changes.year)
            .bind(changes.runtime.map(Runtime::minutes))
            .bind(changes.genres)
            .bind(id.value())
            .bind(expected_version)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(version) = applied {
                return Ok(ConditionalUpdate::Applied { version });
            }

            let current: Option<i32> = sqlx::query_scalar("SELECT version FROM movies WHERE id = $1")
                .bind(id.value())
                .fetch_optional(&self.pool)
                .await?;
            Ok(resolve_miss(current))
        })
    }

    fn delete(&self, id: MovieId) -> BoxFuture<'_, Result<bool, RepositoryError>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM movies WHERE id = $1")
                .bind(id.value())
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
    }
}

impl MovieRepository for PostgresMovieRepository {
    fn list(
        &self,
        query: MovieQuery,
    ) -> BoxFuture<'_, Result<PaginatedResult<Movie>, RepositoryError>> {
        Box::pin(async move {
            let filters = query.filters;
            // Column and direction come from the sort safelist, never from raw input.
            let statement = format!(
                "SELECT count(*) OVER() AS total_records, {MOVIE_COLUMNS} \
                 FROM movies \
                 WHERE (to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '') \
                 AND (genres @> $2 OR $2 = '{{}}') \
                 ORDER BY {} {}, id ASC \
                 LIMIT $3 OFFSET $4",
                filters.sort.field.column(),
                filters.sort.direction.keyword(),
            );

            let rows: Vec<ListedMovieRow> = sqlx::query_as(&statement)
                .bind(query.title.unwrap_or_default())
                .bind(query.genres)
                .bind(i64::from(filters.limit()))
                .bind(i64::try_from(filters.offset()).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await?;

            let total = rows
                .first()
                .map_or(0, |row| u64::try_from(row.total_records).unwrap_or(0));
            let items = rows.into_iter().map(|row| Movie::from(row.movie)).collect();
            Ok(PaginatedResult::new(items, total))
        })
    }
}

// =============================================================================
// PostgreSQL User Repository
// =============================================================================

const USER_COLUMNS: &str = "id, created_at, name, email, password_hash, activated, version";

/// `PostgreSQL` user table.
#[derive(Debug, Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    /// Creates a repository over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl VersionedStore<User> for PostgresUserRepository {
    fn insert(&self, draft: NewUser) -> BoxFuture<'_, Result<User, RepositoryError>> {
        Box::pin(async move {
            let row: UserRow = sqlx::query_as(&format!(
                "INSERT INTO users (name, email, password_hash, activated) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING {USER_COLUMNS}"
            ))
            .bind(&draft.name)
            .bind(&draft.email)
            .bind(draft.password_hash.as_bytes())
            .bind(draft.activated)
            .fetch_one(&self.pool)
            .await?;
            row.try_into()
        })
    }

    fn get_by_id(&self, id: UserId) -> BoxFuture<'_, Result<Option<User>, RepositoryError>> {
        Box::pin(async move {
            let row: Option<UserRow> =
                sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                    .bind(id.value())
                    .fetch_optional(&self.pool)
                    .await?;
            row.map(User::try_from).transpose()
        })
    }

    fn conditional_update(
        &self,
        id: UserId,
        expected_version: i32,
        changes: UserChanges,
    ) -> BoxFuture<'_, Result<ConditionalUpdate, RepositoryError>> {
        Box::pin(async move {
            let applied: Option<i32> = sqlx::query_scalar(
                "UPDATE users \
                 SET name = COALESCE($1, name), \
                     email = COALESCE($2, email), \
                     password_hash = COALESCE($3, password_hash), \
                     activated = COALESCE($4, activated), \
                     version = version + 1 \
                 WHERE id = $5 AND version = $6 \
                 RETURNING version",
            )
            .bind(changes.name)
            .bind(changes.email)
            .bind(changes.password_hash.map(|hash| hash.as_bytes().to_vec()))
            .bind(changes.activated)
            .bind(id.value())
            .bind(expected_version)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(version) = applied {
                return Ok(ConditionalUpdate::Applied { version });
            }

            let current: Option<i32> = sqlx::query_scalar("SELECT version FROM users WHERE id = $1")
                .bind(id.value())
                .fetch_optional(&self.pool)
                .await?;
            Ok(resolve_miss(current))
        })
    }

    fn delete(&self, id: UserId) -> BoxFuture<'_, Result<bool, RepositoryError>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id.value())
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
