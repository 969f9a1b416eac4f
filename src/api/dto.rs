//! Data Transfer Objects for API requests and responses.
//!
//! Request fields are optional at the serde level so that a missing field
//! is reported as a validation failure ("must be provided") rather than a
//! decoding error.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use crate::domain::{
    Filters, Metadata, Movie, MovieChanges, MovieQuery, NewMovie, NewUser, PasswordHash, Runtime,
    User, UserChanges,
};

const MAX_TEXT_BYTES: usize = 500;
const MIN_YEAR: i32 = 1888;
const MAX_GENRES: usize = 5;
const MIN_PASSWORD_BYTES: usize = 8;
const MAX_PASSWORD_BYTES: usize = 72;

// =============================================================================
// Field validators
// =============================================================================

fn validate_title(errors: &mut ValidationError, title: &str) {
    errors.check(!title.trim().is_empty(), "title", "must be provided");
    errors.check(
        title.len() <= MAX_TEXT_BYTES,
        "title",
        "must not be more than 500 bytes long",
    );
}

fn validate_year(errors: &mut ValidationError, year: i32) {
    errors.check(year >= MIN_YEAR, "year", "must be greater than 1888");
    errors.check(year <= Utc::now().year(), "year", "must not be in the future");
}

fn validate_runtime(errors: &mut ValidationError, runtime: Runtime) {
    errors.check(runtime.minutes() > 0, "runtime", "must be a positive integer");
}

fn validate_genres(errors: &mut ValidationError, genres: &[String]) {
    errors.check(!genres.is_empty(), "genres", "must contain at least 1 genre");
    errors.check(
        genres.len() <= MAX_GENRES,
        "genres",
        "must not contain more than 5 genres",
    );
    errors.check(
        genres.iter().all(|genre| !genre.trim().is_empty()),
        "genres",
        "must not contain empty values",
    );
    let unique: HashSet<&String> = genres.iter().collect();
    errors.check(
        unique.len() == genres.len(),
        "genres",
        "must not contain duplicate values",
    );
}

fn validate_name(errors: &mut ValidationError, name: &str) {
    errors.check(!name.trim().is_empty(), "name", "must be provided");
    errors.check(
        name.len() <= MAX_TEXT_BYTES,
        "name",
        "must not be more than 500 bytes long",
    );
}

fn validate_email(errors: &mut ValidationError, email: &str) {
    errors.check(!email.is_empty(), "email", "must be provided");
    errors.check(is_email(email), "email", "must be a valid email address");
}

fn validate_password(errors: &mut ValidationError, password: &str) {
    errors.check(
        password.len() >= MIN_PASSWORD_BYTES,
        "password",
        "must be at least 8 bytes long",
    );
    errors.check(
        password.len() <= MAX_PASSWORD_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
}

/// Shape check: one `@`, a non-empty local part and a dotted domain.
fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}

fn required<T>(errors: &mut ValidationError, value: Option<T>, field: &str) -> Option<T> {
    errors.check(value.is_some(), field, "must be provided");
    value
}

// =============================================================================
// Movie DTOs
// =============================================================================

/// Request DTO for creating a movie.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateMovieRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub runtime: Option<Runtime>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
}

impl CreateMovieRequest {
    /// Validates every field and builds the draft.
    ///
    /// # Errors
    ///
    /// Returns all field failures at once.
    pub fn validate(self) -> Result<NewMovie, ValidationError> {
        let mut errors = ValidationError::default();

        let title = required(&mut errors, self.title, "title");
        let year = required(&mut errors, self.year, "year");
        let runtime = required(&mut errors, self.runtime, "runtime");
        let genres = required(&mut errors, self.genres, "genres");

        if let Some(title) = &title {
            validate_title(&mut errors, title);
        }
        if let Some(year) = year {
            validate_year(&mut errors, year);
        }
        if let Some(runtime) = runtime {
            validate_runtime(&mut errors, runtime);
        }
        if let Some(genres) = &genres {
            validate_genres(&mut errors, genres);
        }

        match (title, year, runtime, genres) {
            (Some(title), Some(year), Some(runtime), Some(genres)) if errors.is_empty() => {
                Ok(NewMovie {
                    title,
                    year,
                    runtime,
                    genres,
                })
            }
            _ => Err(errors),
        }
    }
}

/// Request DTO for a partial movie update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMovieRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub runtime: Option<Runtime>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
    /// Version the client last read. When absent the freshly read version
    /// is used.
    #[serde(default)]
    pub version: Option<i32>,
}

impl UpdateMovieRequest {
    /// Validates supplied fields and builds the change set.
    ///
    /// # Errors
    ///
    /// Returns all field failures at once.
    pub fn validate(self) -> Result<(MovieChanges, Option<i32>), ValidationError> {
        let mut errors = ValidationError::default();

        if let Some(title) = &self.title {
            validate_title(&mut errors, title);
        }
        if let Some(year) = self.year {
            validate_year(&mut errors, year);
        }
        if let Some(runtime) = self.runtime {
            validate_runtime(&mut errors, runtime);
        }
        if let Some(genres) = &self.genres {
            validate_genres(&mut errors, genres);
        }
        if let Some(version) = self.version {
            errors.check(version >= 1, "version", "must be a positive integer");
        }
        errors.into_result()?;

        let changes = MovieChanges {
            title: self.title,
            year: self.year,
            runtime: self.runtime,
            genres: self.genres,
        };
        Ok((changes, self.version))
    }
}

/// Raw query string of `GET /v1/api/movies`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListMoviesQuery {
    #[serde(default)]
    pub title: Option<String>,
    /// Comma-separated genre list.
    #[serde(default)]
    pub genres: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub page_size: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
}

impl ListMoviesQuery {
    /// Validates the query string.
    ///
    /// # Errors
    ///
    /// Returns all parameter failures at once.
    pub fn validate(self) -> Result<MovieQuery, ValidationError> {
        let mut errors = ValidationError::default();

        let page = parse_integer(&mut errors, self.page.as_deref(), "page");
        let page_size = parse_integer(&mut errors, self.page_size.as_deref(), "page_size");
        let filters = Filters::parse(page, page_size, self.sort.as_deref().map(str::trim));

        match filters {
            Ok(filters) if errors.is_empty() => Ok(MovieQuery {
                title: self
                    .title
                    .map(|title| title.trim().to_string())
                    .filter(|title| !title.is_empty()),
                genres: self
                    .genres
                    .map(|genres| {
                        genres
                            .split(',')
                            .map(str::trim)
                            .filter(|genre| !genre.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default(),
                filters,
            }),
            Ok(_) => Err(errors),
            Err(violations) => {
                let ValidationError { errors: extra } = violations.into();
                errors.errors.extend(extra);
                Err(errors)
            }
        }
    }
}

fn parse_integer(errors: &mut ValidationError, raw: Option<&str>, field: &str) -> Option<i64> {
    let raw = raw.map(str::trim).filter(|value| !value.is_empty())?;
    let parsed = raw.parse::<i64>().ok();
    errors.check(parsed.is_some(), field, "must be an integer value");
    parsed
}

/// Response DTO for a movie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieResponse {
    pub id: i64,
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: i32,
}

impl From<&Movie> for MovieResponse {
    fn from(movie: &Movie) -> Self {
        Self {
            id: movie.id.value(),
            title: movie.title.clone(),
            year: movie.year,
            runtime: movie.runtime,
            genres: movie.genres.clone(),
            version: movie.version,
        }
    }
}

/// `{"movie": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieEnvelope {
    pub movie: MovieResponse,
}

impl From<&Movie> for MovieEnvelope {
    fn from(movie: &Movie) -> Self {
        Self {
            movie: movie.into(),
        }
    }
}

/// Body of `GET /v1/api/movies`.
#[derive(Debug, Clone, Serialize)]
pub struct MovieListResponse {
    pub movies: Vec<MovieResponse>,
    pub metadata: Metadata,
}

// =============================================================================
// User DTOs
// =============================================================================

/// Request DTO for `POST /v1/api/users/register`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// A registration that passed validation. The password is not hashed yet.
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Registration {
    /// Builds the insert draft around an already computed hash.
    #[must_use]
    pub fn into_new_user(self, password_hash: PasswordHash) -> NewUser {
        NewUser {
            name: self.name,
            email: self.email,
            password_hash,
            activated: false,
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Registration")
            .field("name", &self.name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl RegisterUserRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns all field failures at once.
    pub fn validate(self) -> Result<Registration, ValidationError> {
        let mut errors = ValidationError::default();

        let name = required(&mut errors, self.name, "name");
        let email = required(&mut errors, self.email.map(|email| email.trim().to_string()), "email");
        let password = required(&mut errors, self.password, "password");

        if let Some(name) = &name {
            validate_name(&mut errors, name);
        }
        if let Some(email) = &email {
            validate_email(&mut errors, email);
        }
        if let Some(password) = &password {
            validate_password(&mut errors, password);
        }

        match (name, email, password) {
            (Some(name), Some(email), Some(password)) if errors.is_empty() => Ok(Registration {
                name,
                email,
                password,
            }),
            _ => Err(errors),
        }
    }
}

/// Request DTO for a partial user update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub activated: Option<bool>,
    #[serde(default)]
    pub version: Option<i32>,
}

/// A validated partial update. A new password is still in plaintext.
pub struct UserUpdate {
    pub changes: UserChanges,
    pub password: Option<String>,
    pub version: Option<i32>,
}

impl UserUpdate {
    /// Returns true if the update would change nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.password.is_none()
    }
}

impl fmt::Debug for UserUpdate {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("UserUpdate")
            .field("changes", &self.changes)
            .field("password", &self.password.as_ref().map(|_| ".."))
            .field("version", &self.version)
            .finish()
    }
}

impl UpdateUserRequest {
    /// Validates supplied fields and builds the change set.
    ///
    /// # Errors
    ///
    /// Returns all field failures at once.
    pub fn validate(self) -> Result<UserUpdate, ValidationError> {
        let mut errors = ValidationError::default();
        let email = self.email.map(|email| email.trim().to_string());

        if let Some(name) = &self.name {
            validate_name(&mut errors, name);
        }
        if let Some(email) = &email {
            validate_email(&mut errors, email);
        }
        if let Some(password) = &self.password {
            validate_password(&mut errors, password);
        }
        if let Some(version) = self.version {
            errors.check(version >= 1, "version", "must be a positive integer");
        }
        errors.into_result()?;

        Ok(UserUpdate {
            changes: UserChanges {
                name: self.name,
                email,
                password_hash: None,
                activated: self.activated,
            },
            password: self.password,
            version: self.version,
        })
    }
}

/// Response DTO for a user. The password hash never leaves the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub activated: bool,
    pub version: i32,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.value(),
            created_at: user.created_at,
            name: user.name.clone(),
            email: user.email.clone(),
            activated: user.activated,
            version: user.version,
        }
    }
}

/// `{"user": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEnvelope {
    pub user: UserResponse,
}

impl From<&User> for UserEnvelope {
    fn from(user: &User) -> Self {
        Self { user: user.into() }
    }
}

// =============================================================================
// Misc
// =============================================================================

/// `{"message": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Body of `GET /v1/api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub system_info: SystemInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub environment: String,
    pub version: String,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MIN_PASSWORD_COST, SortDirection, SortField};
    use rstest::rstest;
    use serde_json::json;

    fn fields(error: &ValidationError) -> Vec<&str> {
        error.errors.iter().map(|error| error.field.as_str()).collect()
    }

    fn create_request() -> CreateMovieRequest {
        CreateMovieRequest {
            title: Some("Moana".to_string()),
            year: Some(2016),
            runtime: Some(Runtime::from_minutes(107)),
            genres: Some(vec!["animation".to_string(), "adventure".to_string()]),
        }
    }

    #[rstest]
    fn test_create_movie_valid() {
        let movie = create_request().validate().unwrap();
        assert_eq!(movie.title, "Moana");
        assert_eq!(movie.runtime.minutes(), 107);
    }

    #[rstest]
    fn test_create_movie_missing_fields() {
        let error = CreateMovieRequest::default().validate().unwrap_err();
        assert_eq!(fields(&error), vec!["title", "year", "runtime", "genres"]);
        assert!(error.errors.iter().all(|error| error.message == "must be provided"));
    }

    #[rstest]
    #[case::old_year(CreateMovieRequest { year: Some(1700), ..create_request() }, "year")]
    #[case::future_year(CreateMovieRequest { year: Some(9999), ..create_request() }, "year")]
    #[case::zero_runtime(CreateMovieRequest { runtime: Some(Runtime::from_minutes(0)), ..create_request() }, "runtime")]
    #[case::long_title(CreateMovieRequest { title: Some("x".repeat(501)), ..create_request() }, "title")]
    #[case::no_genres(CreateMovieRequest { genres: Some(vec![]), ..create_request() }, "genres")]
    #[case::duplicate_genres(CreateMovieRequest { genres: Some(vec!["a".into(), "a".into()]), ..create_request() }, "genres")]
    #[case::too_many_genres(CreateMovieRequest { genres: Some((0..6).map(|i| i.to_string()).collect()), ..create_request() }, "genres")]
    fn test_create_movie_invalid(#[case] request: CreateMovieRequest, #[case] field: &str) {
        let error = request.validate().unwrap_err();
        assert_eq!(fields(&error), vec![field]);
    }

    #[rstest]
    fn test_update_movie_only_supplied_fields() {
        let request = UpdateMovieRequest {
            year: Some(1999),
            version: Some(3),
            ..UpdateMovieRequest::default()
        };
        let (changes, version) = request.validate().unwrap();
        assert_eq!(changes.year, Some(1999));
        assert!(changes.title.is_none());
        assert_eq!(version, Some(3));
    }

    #[rstest]
    fn test_update_movie_rejects_bad_version() {
        let request = UpdateMovieRequest {
            title: Some("X".to_string()),
            version: Some(0),
            ..UpdateMovieRequest::default()
        };
        assert_eq!(fields(&request.validate().unwrap_err()), vec!["version"]);
    }

    #[rstest]
    fn test_list_query_defaults() {
        let query = ListMoviesQuery::default().validate().unwrap();
        assert_eq!(query.filters, Filters::default());
        assert!(query.genres.is_empty());
        assert!(query.title.is_none());
    }

    #[rstest]
    fn test_list_query_parses_everything() {
        let query = ListMoviesQuery {
            title: Some(" black panther ".to_string()),
            genres: Some("action, adventure,".to_string()),
            page: Some("2".to_string()),
            page_size: Some("5".to_string()),
            sort: Some("-year".to_string()),
        }
        .validate()
        .unwrap();

        assert_eq!(query.title.as_deref(), Some("black panther"));
        assert_eq!(query.genres, vec!["action", "adventure"]);
        assert_eq!(query.filters.page, 2);
        assert_eq!(query.filters.page_size, 5);
        assert_eq!(query.filters.sort.field, SortField::Year);
        assert_eq!(query.filters.sort.direction, SortDirection::Descending);
    }

    #[rstest]
    fn test_list_query_collects_all_violations() {
        let error = ListMoviesQuery {
            page: Some("abc".to_string()),
            page_size: Some("1000".to_string()),
            sort: Some("rating".to_string()),
            ..ListMoviesQuery::default()
        }
        .validate()
        .unwrap_err();

        assert_eq!(fields(&error), vec!["page", "page_size", "sort"]);
    }

    #[rstest]
    #[case("alice@example.com", true)]
    #[case("a.b+c@mail.example.org", true)]
    #[case("alice@example", false)]
    #[case("alice@@example.com", false)]
    #[case("@example.com", false)]
    #[case("alice example@x.com", false)]
    #[case("alice@example..com", false)]
    fn test_is_email(#[case] value: &str, #[case] expected: bool) {
        assert_eq!(is_email(value), expected);
    }

    #[rstest]
    fn test_register_keeps_password_for_hashing() {
        let registration = RegisterUserRequest {
            name: Some("Alice".to_string()),
            email: Some(" alice@example.com ".to_string()),
            password: Some("pa55word".to_string()),
        }
        .validate()
        .unwrap();

        assert_eq!(registration.email, "alice@example.com");
        assert_eq!(registration.password, "pa55word");
        assert!(!format!("{registration:?}").contains("pa55word"));

        let hash = PasswordHash::hash(&registration.password, MIN_PASSWORD_COST).unwrap();
        let user = registration.into_new_user(hash);
        assert!(!user.activated);
        assert!(user.password_hash.matches("pa55word"));
    }

    #[rstest]
    #[case(json!({"password": "new-pa55word"}), false)]
    #[case(json!({"activated": true}), false)]
    #[case(json!({"version": 3}), true)]
    #[case(json!({}), true)]
    fn test_user_update_emptiness(#[case] body: serde_json::Value, #[case] empty: bool) {
        let request: UpdateUserRequest = serde_json::from_value(body).unwrap();
        let update = request.validate().unwrap();

        assert_eq!(update.is_empty(), empty);
        assert!(update.changes.password_hash.is_none());
    }

    #[rstest]
    #[case("short", "password")]
    #[case(&"x".repeat(73), "password")]
    fn test_register_password_bounds(#[case] password: &str, #[case] field: &str) {
        let error = RegisterUserRequest {
            name: Some("Alice".to_string()),
            email: Some("alice@example.com".to_string()),
            password: Some(password.to_string()),
        }
        .validate()
        .unwrap_err();
        assert_eq!(fields(&error), vec![field]);
    }

    #[rstest]
    fn test_user_response_has_no_password() {
        let user = User::from_new(
            crate::domain::UserId::new(1),
            Utc::now(),
            RegisterUserRequest {
                name: Some("Alice".to_string()),
                email: Some("alice@example.com".to_string()),
                password: Some("pa55word".to_string()),
            }
            .validate()
            .unwrap()
            .into_new_user(PasswordHash::hash("pa55word", MIN_PASSWORD_COST).unwrap()),
        );
        let json = serde_json::to_value(UserEnvelope::from(&user)).unwrap();
        assert!(json["user"].get("password").is_none());
        assert!(json["user"].get("password_hash").is_none());
        assert_eq!(json["user"]["activated"], false);
    }

    #[rstest]
    fn test_movie_response_runtime_format() {
        let movie = Movie::from_new(
            crate::domain::MovieId::new(1),
            Utc::now(),
            create_request().validate().unwrap(),
        );
        let json = serde_json::to_value(MovieEnvelope::from(&movie)).unwrap();
        assert_eq!(json["movie"]["runtime"], "107 mins");
        assert_eq!(json["movie"]["version"], 1);
    }
}
