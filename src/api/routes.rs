//! Router assembly.

use axum::{
    Router,
    http::HeaderValue,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::error::ApiErrorResponse;
use super::handlers::{AppState, health_check};
use super::middleware::admission;
use super::movies::{create_movie, delete_movie, list_movies, show_movie, update_movie};
use super::users::{register_user, update_user};
use crate::config::HttpConfig;

/// Builds the full application router.
///
/// Every route, including the 404 and 405 fallbacks, passes the admission
/// gate first. Requests running longer than `http.request_timeout` are
/// dropped, which also abandons any store call still in flight.
pub fn router(state: AppState, http: &HttpConfig) -> Router {
    let gate = state.gate.clone();

    Router::new()
        .route("/v1/api/health", get(health_check))
        .route("/v1/api/movies", get(list_movies).post(create_movie))
        .route(
            "/v1/api/movies/{id}",
            get(show_movie).patch(update_movie).delete(delete_movie),
        )
        .route("/v1/api/users/register", post(register_user))
        .route("/v1/api/users/{id}", patch(update_user))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(middleware::from_fn_with_state(gate, admission))
        .layer(TimeoutLayer::new(http.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors(&http.allowed_origins))
        .with_state(state)
}

fn cors(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(%origin, %error, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn not_found() -> impl IntoResponse {
    ApiErrorResponse::not_found()
}

async fn method_not_allowed() -> impl IntoResponse {
    ApiErrorResponse::method_not_allowed()
}
