//! Handlers for `/v1/api/movies`.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::IntoResponse,
};

use super::dto::{
    CreateMovieRequest, ListMoviesQuery, MessageResponse, MovieEnvelope, MovieListResponse,
    MovieResponse, UpdateMovieRequest,
};
use super::error::ApiErrorResponse;
use super::handlers::AppState;
use crate::domain::{Metadata, MovieId};

/// Ids are positive; anything else cannot name a movie.
fn movie_id(path: Result<Path<i64>, PathRejection>) -> Result<MovieId, ApiErrorResponse> {
    let Path(id) = path?;
    if id < 1 {
        return Err(ApiErrorResponse::not_found());
    }
    Ok(MovieId::new(id))
}

// =============================================================================
// POST /v1/api/movies
// =============================================================================

/// Creates a movie at version 1.
///
/// # Errors
///
/// - 400 when the body is not valid JSON
/// - 422 when a field fails validation
/// - 500 when the store fails
pub async fn create_movie(
    State(state): State<AppState>,
    body: Result<Json<CreateMovieRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiErrorResponse> {
    let Json(request) = body?;
    let draft = request.validate()?;

    let movie = state.movies.insert(draft).await?;
    tracing::info!(movie_id = %movie.id, "Movie created");

    let location = format!("/v1/api/movies/{}", movie.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(MovieEnvelope::from(&movie)),
    ))
}

// =============================================================================
// GET /v1/api/movies/{id}
// =============================================================================

/// Returns one movie.
///
/// # Errors
///
/// 404 when no movie has this id.
pub async fn show_movie(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MovieEnvelope>, ApiErrorResponse> {
    let id = movie_id(path)?;
    let movie = state.movies.get(id).await?;
    Ok(Json(MovieEnvelope::from(&movie)))
}

// =============================================================================
// GET /v1/api/movies
// =============================================================================

/// Lists movies filtered by title words and genres, sorted and paginated.
///
/// # Errors
///
/// 422 when a pagination or sort parameter is invalid.
pub async fn list_movies(
    State(state): State<AppState>,
    query: Result<Query<ListMoviesQuery>, QueryRejection>,
) -> Result<Json<MovieListResponse>, ApiErrorResponse> {
    let Query(query) = query?;
    let query = query.validate()?;
    let filters = query.filters;

    let page = state.movie_repository.list(query).await?;

    Ok(Json(MovieListResponse {
        movies: page.items.iter().map(MovieResponse::from).collect(),
        metadata: Metadata::calculate(page.total, &filters),
    }))
}

// =============================================================================
// PATCH /v1/api/movies/{id}
// =============================================================================

/// Applies a partial update under optimistic concurrency control.
///
/// When the body carries `version`, the update only succeeds if the stored
/// movie is still at that version. Otherwise the version just read is used,
/// which still rejects a writer that slipped in between the read and the
/// write.
///
/// # Errors
///
/// - 400 when the body is not valid JSON or changes nothing
/// - 404 when the movie does not exist
/// - 409 when the movie was modified concurrently
/// - 422 when a field fails validation
pub async fn update_movie(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<UpdateMovieRequest>, JsonRejection>,
) -> Result<Json<MovieEnvelope>, ApiErrorResponse> {
    let id = movie_id(path)?;
    let Json(request) = body?;
    let (changes, expected_version) = request.validate()?;
    if changes.is_empty() {
        return Err(ApiErrorResponse::bad_request(
            "NO_CHANGES",
            "no data to update",
        ));
    }

    let mut movie = state.movies.get(id).await?;
    if let Some(version) = expected_version {
        movie.version = version;
    }

    state.movies.update(&mut movie, changes).await?;
    tracing::info!(movie_id = %movie.id, version = movie.version, "Movie updated");

    Ok(Json(MovieEnvelope::from(&movie)))
}

// =============================================================================
// DELETE /v1/api/movies/{id}
// =============================================================================

/// Deletes a movie regardless of its version.
///
/// # Errors
///
/// 404 when no movie has this id.
pub async fn delete_movie(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiErrorResponse> {
    let id = movie_id(path)?;
    state.movies.delete(id).await?;
    tracing::info!(movie_id = %id, "Movie deleted");

    Ok(Json(MessageResponse::new("movie successfully deleted")))
}
