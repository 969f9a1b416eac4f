//! Common test helpers for integration tests.
//!
//! # Note
//!
//! The `#![allow(dead_code)]` attribute is necessary because Rust compiles each
//! integration test file as a separate crate. Helpers used only by some test
//! files would otherwise generate dead code warnings in the others.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use greenlight_api::admission::{AdmissionConfig, AdmissionGate};
use greenlight_api::api::{AppState, router};
use greenlight_api::config::{AppInfo, HttpConfig};
use greenlight_api::domain::{MIN_PASSWORD_COST, Movie, NewMovie, Runtime};
use greenlight_api::infrastructure::{Mailer, Repositories, StubMailer, TaskDrain};

pub const CLIENT: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::new(203, 0, 113, 7)),
    50_000,
);

// =============================================================================
// AppState Creation Helpers
// =============================================================================

/// In-memory state with admission disabled and a recording mailer.
pub fn create_test_app_state() -> (AppState, StubMailer) {
    create_test_app_state_with(AdmissionConfig::disabled(), StubMailer::new())
}

/// In-memory state with the given gate settings and mailer.
///
/// # Panics
///
/// Panics if `admission` is invalid.
pub fn create_test_app_state_with(
    admission: AdmissionConfig,
    mailer: StubMailer,
) -> (AppState, StubMailer) {
    let state = create_state_from(
        &Repositories::in_memory(),
        Arc::new(mailer.clone()),
        admission,
    );
    (state, mailer)
}

/// State over caller-supplied repositories and mailer.
///
/// Passwords are hashed at the lowest bcrypt cost to keep tests fast.
///
/// # Panics
///
/// Panics if `admission` is invalid.
pub fn create_state_from(
    repositories: &Repositories,
    mailer: Arc<dyn Mailer>,
    admission: AdmissionConfig,
) -> AppState {
    let gate = Arc::new(AdmissionGate::new(admission).expect("valid admission config"));
    AppState::new(
        repositories,
        mailer,
        gate,
        TaskDrain::new(),
        AppInfo {
            name: "greenlight".to_string(),
            environment: "test".to_string(),
            version: "0.0.0-test".to_string(),
        },
    )
    .with_password_cost(MIN_PASSWORD_COST)
}

// =============================================================================
// Router Helpers
// =============================================================================

/// Router whose requests appear to come from `peer`.
pub fn app_from(state: AppState, peer: SocketAddr) -> Router {
    router(state, &HttpConfig::default()).layer(MockConnectInfo(peer))
}

/// Router built with custom HTTP settings, requests from [`CLIENT`].
pub fn app_with_http(state: AppState, http: &HttpConfig) -> Router {
    router(state, http).layer(MockConnectInfo(CLIENT))
}

/// Router whose requests appear to come from [`CLIENT`].
pub fn app(state: AppState) -> Router {
    app_from(state, CLIENT)
}

/// Router without connection info, as if served without peer addresses.
pub fn app_without_peer(state: AppState) -> Router {
    router(state, &HttpConfig::default())
}

pub fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("valid request")
}

/// Sends one request and decodes the JSON body (`Value::Null` when empty).
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("readable body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("JSON body")
    };
    (status, body)
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn new_movie(title: &str) -> NewMovie {
    NewMovie {
        title: title.to_string(),
        year: 2016,
        runtime: Runtime::from_minutes(107),
        genres: vec!["animation".to_string(), "adventure".to_string()],
    }
}

pub async fn create_and_save_movie(state: &AppState, title: &str) -> Movie {
    state
        .movies
        .insert(new_movie(title))
        .await
        .expect("insert succeeds")
}
