//! Admission control in front of every route.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    RequestExt,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::error::ApiErrorResponse;
use crate::admission::{AdmissionGate, ClientId};

/// Rejects the request with 429 when its client is over the rate limit.
///
/// The client is the peer IP address. When the server was started without
/// connection info there is no peer address, which is answered with 500
/// rather than a throttle decision. A disabled gate skips the check
/// entirely.
pub async fn admission(
    State(gate): State<Arc<AdmissionGate>>,
    mut request: Request,
    next: Next,
) -> Response {
    if !gate.is_enabled() {
        return next.run(request).await;
    }

    let peer = request
        .extract_parts::<ConnectInfo<SocketAddr>>()
        .await
        .ok()
        .map(|ConnectInfo(address)| address);
    let client = match ClientId::from_peer(peer.as_ref()) {
        Ok(client) => client,
        Err(error) => return ApiErrorResponse::from(error).into_response(),
    };

    if !gate.admit(&client) {
        tracing::debug!(%client, "Request throttled");
        return ApiErrorResponse::rate_limit_exceeded().into_response();
    }

    next.run(request).await
}
