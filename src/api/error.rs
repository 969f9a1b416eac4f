//! API error handling.
//!
//! Every failure leaves the service as a JSON body of the form
//! `{ "code": ..., "message": ..., "details": [...] }`. Internal causes are
//! logged here and never copied into the response.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::admission::IdentityError;
use crate::domain::{FilterViolation, PasswordHashError};
use crate::infrastructure::{RepositoryError, StoreError};

// =============================================================================
// API Error
// =============================================================================

/// API error structure for JSON responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional field-level errors for validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl ApiError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Creates a validation error with field-level details.
    #[must_use]
    pub fn validation(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self {
            code: "VALIDATION_ERROR".to_string(),
            message: message.into(),
            details: Some(details),
        }
    }
}

/// Field-level error for validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// API Error Response
// =============================================================================

/// API error response containing status code and error details.
#[derive(Debug, Clone)]
pub struct ApiErrorResponse {
    pub status: StatusCode,
    pub error: ApiError,
}

impl ApiErrorResponse {
    #[must_use]
    pub const fn new(status: StatusCode, error: ApiError) -> Self {
        Self { status, error }
    }

    /// 400, for requests that could not be decoded at all.
    #[must_use]
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiError::new(code, message))
    }

    /// 422, for well-formed requests with invalid values.
    #[must_use]
    pub fn validation_error(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::validation(message, details),
        )
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            ApiError::new("NOT_FOUND", "the requested resource could not be found"),
        )
    }

    #[must_use]
    pub fn method_not_allowed() -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            ApiError::new(
                "METHOD_NOT_ALLOWED",
                "the method is not supported for this resource",
            ),
        )
    }

    /// 409, the resource changed since the client read it.
    #[must_use]
    pub fn edit_conflict() -> Self {
        Self::new(
            StatusCode::CONFLICT,
            ApiError::new(
                "EDIT_CONFLICT",
                "unable to update the record due to an edit conflict, please try again",
            ),
        )
    }

    #[must_use]
    pub fn rate_limit_exceeded() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            ApiError::new("RATE_LIMIT_EXCEEDED", "rate limit exceeded"),
        )
    }

    #[must_use]
    pub fn internal_error() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::new(
                "INTERNAL_ERROR",
                "the server encountered a problem and could not process your request",
            ),
        )
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

impl From<StoreError> for ApiErrorResponse {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { .. } => Self::edit_conflict(),
            StoreError::NotFound { .. } => Self::not_found(),
            StoreError::Duplicate { kind: "user", .. } => {
                ValidationError::single("email", "a user with this email address already exists")
                    .into()
            }
            StoreError::Duplicate { constraint, .. } => {
                ValidationError::single(constraint, "duplicate value").into()
            }
            StoreError::Unavailable(source) => {
                tracing::error!(error = %source, "Store unavailable");
                Self::internal_error()
            }
        }
    }
}

impl From<RepositoryError> for ApiErrorResponse {
    fn from(error: RepositoryError) -> Self {
        tracing::error!(error = %error, "Repository query failed");
        Self::internal_error()
    }
}

impl From<PasswordHashError> for ApiErrorResponse {
    fn from(error: PasswordHashError) -> Self {
        tracing::error!(error = %error, "Password hashing failed");
        Self::internal_error()
    }
}

impl From<IdentityError> for ApiErrorResponse {
    fn from(error: IdentityError) -> Self {
        tracing::error!(error = %error, "Could not identify client");
        Self::internal_error()
    }
}

impl From<JsonRejection> for ApiErrorResponse {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("BAD_REQUEST", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiErrorResponse {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request("BAD_REQUEST", rejection.body_text())
    }
}

impl From<PathRejection> for ApiErrorResponse {
    fn from(_: PathRejection) -> Self {
        Self::not_found()
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Accumulated field-level validation failures.
#[derive(Debug, Clone, Default)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    #[must_use]
    pub const fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![FieldError::new(field, message)])
    }

    /// Records a failure for `field` when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing was recorded.
    ///
    /// # Errors
    ///
    /// Returns `self` when at least one field failed.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<ValidationError> for ApiErrorResponse {
    fn from(error: ValidationError) -> Self {
        Self::validation_error("Validation failed", error.errors)
    }
}

impl From<Vec<FilterViolation>> for ValidationError {
    fn from(violations: Vec<FilterViolation>) -> Self {
        Self::new(
            violations
                .into_iter()
                .map(|violation| FieldError::new(violation.field, violation.message))
                .collect(),
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
