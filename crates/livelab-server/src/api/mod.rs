mod live;

use crate::state::AppState;
use crate::ws;
use axum::{Router, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Live session status
        .route("/api/live/status", get(live::get_status))
        // WebRTC configuration
        .route("/api/rtc/ice-servers", get(crate::webrtc::get_ice_servers))
        // WebSocket endpoint
        .route("/ws", get(ws::handler::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Config;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get_json(router: Router, uri: &str) -> serde_json::Value {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let router = create_router(AppState::new(Config::default()));
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_live_status_starts_offline() {
        let router = create_router(AppState::new(Config::default()));
        let json = get_json(router, "/api/live/status").await;

        assert_eq!(json["live"], false);
        assert_eq!(json["mode"], "OPEN");
        assert_eq!(json["viewers"], 0);
        assert_eq!(json["pending"], serde_json::json!([]));
        assert_eq!(json["online"], 0);
    }

    #[tokio::test]
    async fn test_ice_servers_from_config() {
        let router = create_router(AppState::new(Config::default()));
        let json = get_json(router, "/api/rtc/ice-servers").await;

        assert_eq!(
            json["iceServers"][0]["urls"][0],
            "stun:stun.l.google.com:19302"
        );
        assert!(json["iceServers"][0].get("username").is_none());
    }
}
