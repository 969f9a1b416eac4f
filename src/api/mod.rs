//! HTTP API layer.
//!
//! Handlers translate requests into store calls and store outcomes into
//! responses. The admission middleware runs before any of them.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod movies;
pub mod routes;
pub mod users;

pub use error::{ApiError, ApiErrorResponse, FieldError, ValidationError};
pub use handlers::{AppState, health_check};
pub use middleware::admission;
pub use movies::{create_movie, delete_movie, list_movies, show_movie, update_movie};
pub use routes::router;
pub use users::{register_user, update_user};
