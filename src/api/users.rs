//! Handlers for `/v1/api/users`.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
};

use super::dto::{RegisterUserRequest, UpdateUserRequest, UserEnvelope};
use super::error::ApiErrorResponse;
use super::handlers::AppState;
use crate::domain::{PasswordHash, UserId};
use crate::infrastructure::Email;

/// Hashes `plaintext` on the blocking pool so bcrypt does not hold up an
/// async worker.
async fn hash_password(plaintext: String, cost: u32) -> Result<PasswordHash, ApiErrorResponse> {
    let hashed = tokio::task::spawn_blocking(move || PasswordHash::hash(&plaintext, cost))
        .await
        .map_err(|error| {
            tracing::error!(error = %error, "Password hashing task failed");
            ApiErrorResponse::internal_error()
        })?;
    hashed.map_err(ApiErrorResponse::from)
}

/// Registers a user and queues the welcome email.
///
/// The response does not wait for the email. Delivery runs on the
/// background drain and a failure there is only logged.
///
/// # Errors
///
/// - 400 when the body is not valid JSON
/// - 422 when a field fails validation or the email is already taken
/// - 500 when the password cannot be hashed
pub async fn register_user(
    State(state): State<AppState>,
    body: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserEnvelope>), ApiErrorResponse> {
    let Json(request) = body?;
    let mut registration = request.validate()?;

    let password = std::mem::take(&mut registration.password);
    let password_hash = hash_password(password, state.password_cost).await?;
    let user = state
        .users
        .insert(registration.into_new_user(password_hash))
        .await?;
    tracing::info!(user_id = %user.id, "User registered");

    let mailer = Arc::clone(&state.mailer);
    let email = Email::welcome(&user);
    let user_id = user.id;
    state.background.submit("welcome_email", async move {
        if let Err(error) = mailer.send(email).await {
            tracing::error!(%user_id, error = %error, "Failed to send welcome email");
        }
    });

    Ok((StatusCode::CREATED, Json(UserEnvelope::from(&user))))
}

/// Applies a partial update to a user under optimistic concurrency control.
///
/// # Errors
///
/// - 400 when the body is not valid JSON or changes nothing
/// - 404 when the user does not exist
/// - 409 when the user was modified concurrently
/// - 422 when a field fails validation or the new email is taken
/// - 500 when a new password cannot be hashed
pub async fn update_user(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserEnvelope>, ApiErrorResponse> {
    let Path(id) = path?;
    if id < 1 {
        return Err(ApiErrorResponse::not_found());
    }
    let Json(request) = body?;
    let update = request.validate()?;
    if update.is_empty() {
        return Err(ApiErrorResponse::bad_request(
            "NO_CHANGES",
            "no data to update",
        ));
    }

    let mut user = state.users.get(UserId::new(id)).await?;
    if let Some(version) = update.version {
        user.version = version;
    }

    let mut changes = update.changes;
    if let Some(password) = update.password {
        changes.password_hash = Some(hash_password(password, state.password_cost).await?);
    }

    state.users.update(&mut user, changes).await?;
    tracing::info!(user_id = %user.id, version = user.version, "User updated");

    Ok(Json(UserEnvelope::from(&user)))
}
