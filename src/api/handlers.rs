//! Shared application state and the health endpoint.

use std::sync::Arc;

use axum::{Json, extract::State};

use super::dto::{HealthResponse, SystemInfo};
use crate::admission::AdmissionGate;
use crate::config::AppInfo;
use crate::domain::{DEFAULT_PASSWORD_COST, Movie, User};
use crate::infrastructure::{
    ConcurrencyGuardedStore, Mailer, MovieRepository, Repositories, TaskDrain,
};

// =============================================================================
// Application State
// =============================================================================

/// Shared application dependencies.
///
/// Listing goes to the movie repository directly. Every other read and
/// every write goes through the guarded stores.
#[derive(Clone)]
pub struct AppState {
    pub movie_repository: Arc<dyn MovieRepository>,
    pub movies: ConcurrencyGuardedStore<Movie>,
    pub users: ConcurrencyGuardedStore<User>,
    pub mailer: Arc<dyn Mailer>,
    pub background: TaskDrain,
    pub gate: Arc<AdmissionGate>,
    pub app: AppInfo,
    /// bcrypt work factor for new password hashes.
    pub password_cost: u32,
}

impl AppState {
    /// Wires the state from initialized repositories.
    #[must_use]
    pub fn new(
        repositories: &Repositories,
        mailer: Arc<dyn Mailer>,
        gate: Arc<AdmissionGate>,
        background: TaskDrain,
        app: AppInfo,
    ) -> Self {
        Self {
            movie_repository: Arc::clone(&repositories.movies),
            movies: ConcurrencyGuardedStore::new(repositories.movies.clone()),
            users: ConcurrencyGuardedStore::new(repositories.users.clone()),
            mailer,
            background,
            gate,
            app,
            password_cost: DEFAULT_PASSWORD_COST,
        }
    }

    /// Overrides the bcrypt work factor.
    #[must_use]
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AppState")
            .field("movies", &self.movies)
            .field("users", &self.users)
            .field("mailer", &self.mailer)
            .field("background", &self.background)
            .field("app", &self.app)
            .field("password_cost", &self.password_cost)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// GET /v1/api/health
// =============================================================================

/// Reports that the service is up, with its environment and version.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "available".to_string(),
        system_info: SystemInfo {
            environment: state.app.environment.clone(),
            version: state.app.version.clone(),
        },
    })
}
