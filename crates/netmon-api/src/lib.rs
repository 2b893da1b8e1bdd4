//! netmon-api — HTTP surface of the agent.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` (configurable) | Prometheus text exposition |
//! | GET | `/api/v1/peers` | Current peers and whether each has a record |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use netmon_state::MonitorState;

/// Shared state for handlers.
#[derive(Clone)]
pub struct ApiState {
    pub monitor: MonitorState,
}

/// Build the exporter router, serving metrics at `metrics_path`.
pub fn build_router(monitor: MonitorState, metrics_path: &str) -> Router {
    let api_state = ApiState { monitor };

    let api_routes = Router::new()
        .route("/peers", get(handlers::list_peers))
        .with_state(api_state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route(metrics_path, get(handlers::prometheus_metrics).with_state(api_state))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use netmon_metrics::MetricsRegistry;
    use tower::ServiceExt;

    use super::*;

    fn monitor() -> MonitorState {
        MonitorState::new("a", MetricsRegistry::new("network_monitor"))
    }

    async fn get_body(router: Router, uri: &str) -> (StatusCode, String) {
        let resp = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn serves_metrics_at_configured_path() {
        let state = monitor();
        state.get_or_create("b").await.unwrap();

        let (status, body) = get_body(build_router(state.clone(), "/scrape"), "/scrape").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("network_monitor_reachable{source=\"a\",target=\"b\"}"));

        let (status, _) = get_body(build_router(state, "/scrape"), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn peers_route_is_mounted() {
        let (status, body) = get_body(build_router(monitor(), "/metrics"), "/api/v1/peers").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"success\":true"));
    }

    #[tokio::test]
    async fn metrics_path_beside_api_prefix() {
        for path in ["/api", "/api/v10", "/scrape/metrics"] {
            let router = build_router(monitor(), path);
            let (status, _) = get_body(router.clone(), path).await;
            assert_eq!(status, StatusCode::OK, "{path}");
            let (status, _) = get_body(router, "/api/v1/peers").await;
            assert_eq!(status, StatusCode::OK, "{path}");
        }
    }
}
