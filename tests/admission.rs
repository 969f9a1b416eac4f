//! Integration tests for per-client admission control.
//!
//! # Tests Covered
//!
//! - Token bucket burst and refill timing
//! - Idle eviction followed by a fresh allowance
//! - The HTTP middleware: 429 for throttled clients, 500 without a peer
//!   address, per-client isolation
//! - Sweeper start and stop

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{Method, StatusCode};
use rstest::rstest;

use common::{
    CLIENT, app, app_from, app_without_peer, create_test_app_state_with, empty_request, send,
};
use greenlight_api::admission::{AdmissionConfig, AdmissionGate, ClientId, ManualClock};
use greenlight_api::infrastructure::StubMailer;

fn client(address: &str) -> ClientId {
    ClientId::new(address).unwrap()
}

// =============================================================================
// Gate behaviour
// =============================================================================

#[rstest]
fn test_burst_then_refill_after_half_second() {
    let clock = ManualClock::default();
    let gate = AdmissionGate::with_clock(AdmissionConfig::new(2.0, 4), Arc::new(clock.clone()))
        .unwrap();
    let client = client("198.51.100.1");

    for call in 0..4 {
        assert!(gate.admit(&client), "call {call} at t=0 should be admitted");
    }
    assert!(!gate.admit(&client), "fifth call at t=0 should be rejected");

    clock.advance(Duration::from_millis(500));
    assert!(gate.admit(&client), "one token refilled after 0.5s");
    assert!(!gate.admit(&client));
}

#[rstest]
#[case(1)]
#[case(4)]
#[case(50)]
fn test_first_contact_is_always_admitted(#[case] burst: u32) {
    let gate = AdmissionGate::new(AdmissionConfig::new(1.0, burst)).unwrap();
    assert!(gate.admit(&client("198.51.100.2")));
}

#[rstest]
fn test_full_refill_after_refill_window() {
    let config = AdmissionConfig::new(2.0, 4);
    let gate = AdmissionGate::new(config).unwrap();
    let client = client("198.51.100.3");
    let start = Instant::now();

    for _ in 0..4 {
        assert!(gate.admit_at(&client, start));
    }
    assert!(!gate.admit_at(&client, start));

    let later = start + config.refill_window();
    for _ in 0..4 {
        assert!(gate.admit_at(&client, later));
    }
}

#[rstest]
fn test_idle_client_evicted_then_gets_full_burst() {
    let clock = ManualClock::default();
    let config = AdmissionConfig::new(2.0, 4)
        .with_sweep_interval(Duration::from_secs(60))
        .with_idle_threshold(Duration::from_secs(180));
    let gate = AdmissionGate::with_clock(config, Arc::new(clock.clone())).unwrap();
    let client = client("198.51.100.4");

    for _ in 0..4 {
        assert!(gate.admit(&client));
    }
    assert!(!gate.admit(&client));

    clock.advance(Duration::from_secs(4 * 60));
    assert_eq!(gate.sweep(), 1);
    assert!(gate.bucket(&client).is_none());

    clock.advance(Duration::from_secs(1));
    for _ in 0..4 {
        assert!(gate.admit(&client));
    }
    assert!(!gate.admit(&client));
}

#[rstest]
fn test_active_client_survives_sweep() {
    let clock = ManualClock::default();
    let gate = AdmissionGate::with_clock(AdmissionConfig::new(2.0, 4), Arc::new(clock.clone()))
        .unwrap();
    let idle = client("198.51.100.5");
    let active = client("198.51.100.6");

    gate.admit(&idle);
    gate.admit(&active);
    clock.advance(Duration::from_secs(120));
    gate.admit(&active);
    clock.advance(Duration::from_secs(120));

    assert_eq!(gate.sweep(), 1);
    assert!(gate.bucket(&idle).is_none());
    assert!(gate.bucket(&active).is_some());
}

#[rstest]
fn test_empty_identity_is_rejected_before_the_gate() {
    assert!(ClientId::new("").is_err());
    assert!(ClientId::new("   ").is_err());
}

// =============================================================================
// Sweeper lifecycle
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_sweeper_runs_until_stopped() {
    let gate = AdmissionGate::start(
        AdmissionConfig::new(2.0, 4),
        Arc::new(ManualClock::default()),
    )
    .unwrap();
    assert!(gate.is_sweeping());

    gate.stop().await;
    assert!(!gate.is_sweeping());

    // A second stop is a no-op.
    gate.stop().await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_sweeper_evicts_on_schedule() {
    let clock = ManualClock::default();
    let config = AdmissionConfig::new(2.0, 4)
        .with_sweep_interval(Duration::from_secs(60))
        .with_idle_threshold(Duration::from_secs(180));
    let gate = AdmissionGate::start(config, Arc::new(clock.clone())).unwrap();
    let client = client("198.51.100.7");
    gate.admit(&client);

    for _ in 0..4 {
        clock.advance(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
    // Let the tick at 240s run before checking.
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(gate.tracked_clients(), 0);
    gate.stop().await;
}

// =============================================================================
// Middleware
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_throttled_request_gets_429() {
    let (state, _) = create_test_app_state_with(AdmissionConfig::new(1.0, 2), StubMailer::new());
    let app = app(state);

    for _ in 0..2 {
        let (status, _) = send(&app, empty_request(Method::GET, "/v1/api/health")).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, empty_request(Method::GET, "/v1/api/health")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
}

#[rstest]
#[tokio::test]
async fn test_clients_are_limited_independently() {
    let (state, _) = create_test_app_state_with(AdmissionConfig::new(1.0, 1), StubMailer::new());
    let first = app(state.clone());
    let second = app_from(state.clone(), SocketAddr::from(([192, 0, 2, 99], 40_000)));

    let (status, _) = send(&first, empty_request(Method::GET, "/v1/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&first, empty_request(Method::GET, "/v1/api/health")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _) = send(&second, empty_request(Method::GET, "/v1/api/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[rstest]
#[tokio::test]
async fn test_port_is_not_part_of_identity() {
    let (state, _) = create_test_app_state_with(AdmissionConfig::new(1.0, 1), StubMailer::new());
    let first = app(state.clone());
    let same_host = app_from(state, SocketAddr::new(CLIENT.ip(), CLIENT.port() + 1));

    let (status, _) = send(&first, empty_request(Method::GET, "/v1/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&same_host, empty_request(Method::GET, "/v1/api/health")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[rstest]
#[tokio::test]
async fn test_missing_peer_address_is_a_server_error() {
    let (state, _) = create_test_app_state_with(AdmissionConfig::new(1.0, 2), StubMailer::new());
    let app = app_without_peer(state);

    let (status, body) = send(&app, empty_request(Method::GET, "/v1/api/health")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "INTERNAL_ERROR");
}

#[rstest]
#[tokio::test]
async fn test_disabled_gate_admits_everything() {
    let (state, _) = create_test_app_state_with(AdmissionConfig::disabled(), StubMailer::new());
    let app = app_without_peer(state.clone());

    for _ in 0..20 {
        let (status, _) = send(&app, empty_request(Method::GET, "/v1/api/health")).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(state.gate.tracked_clients(), 0);
}

#[rstest]
#[tokio::test]
async fn test_fallbacks_are_rate_limited_too() {
    let (state, _) = create_test_app_state_with(AdmissionConfig::new(1.0, 1), StubMailer::new());
    let app = app(state);

    let (status, _) = send(&app, empty_request(Method::GET, "/no/such/route")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, empty_request(Method::GET, "/no/such/route")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
