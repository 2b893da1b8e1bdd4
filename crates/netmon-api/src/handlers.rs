//! HTTP handlers.

use std::collections::HashSet;
use std::net::IpAddr;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::error;

use netmon_metrics::TEXT_CONTENT_TYPE;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

/// One entry of the peer listing.
#[derive(Debug, Serialize)]
pub struct PeerView {
    pub name: String,
    pub internal_ip: IpAddr,
    /// Whether metrics are currently exported for this peer.
    pub tracked: bool,
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    match state.monitor.metrics().render() {
        Ok(body) => (StatusCode::OK, [(CONTENT_TYPE, TEXT_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// GET /api/v1/peers
pub async fn list_peers(State(state): State<ApiState>) -> impl IntoResponse {
    let peers = state.monitor.peers().await;
    let tracked: HashSet<String> = state.monitor.tracked_targets().await.into_iter().collect();

    let views: Vec<PeerView> = peers
        .iter()
        .map(|peer| PeerView {
            name: peer.name.clone(),
            internal_ip: peer.internal_ip,
            tracked: tracked.contains(&peer.name),
        })
        .collect();

    ApiResponse::ok(views)
}
