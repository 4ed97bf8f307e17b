//! HTTP API gateway for MediaClaw.
//!
//! Serves the v1 API under `/api/v1`: streamed chat over SSE, synchronous
//! chat, session reset and inspection, tool listing and health.

pub mod api_v1;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use mediaclaw_agent::Orchestrator;
use mediaclaw_config::GatewayConfig;

/// Largest request body accepted, in bytes.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the full router.
///
/// Layers applied:
/// - CORS limited to the configured web UI origins
/// - Request body size limit (64 KiB)
/// - HTTP trace logging
pub fn build_router(config: &GatewayConfig, orchestrator: Orchestrator) -> Router {
    let api_state = api_v1::ApiV1State::new(orchestrator);

    Router::new()
        .nest("/api/v1", api_v1::v1_router(api_state))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(&config.cors_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Start the gateway HTTP server and serve until the process stops.
pub async fn start(config: mediaclaw_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let orchestrator = mediaclaw_agent::build_orchestrator(&config)?;
    info!(
        engine = orchestrator.engine_name(),
        tools = orchestrator.tools().list_descriptors().len(),
        max_iterations = orchestrator.max_iterations(),
        "Agent ready"
    );

    let app = build_router(&config.gateway, orchestrator);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    use mediaclaw_agent::{SessionStore, testing::ScriptedEngine};
    use mediaclaw_tools::ToolRegistry;
    use mediaclaw_tools::testing::{FakeLibrary, FakeTorrents};

    fn app() -> Router {
        let tools = Arc::new(ToolRegistry::new(
            Arc::new(FakeLibrary::movies()),
            Arc::new(FakeLibrary::series()),
            Arc::new(FakeTorrents::default()),
        ));
        let orchestrator = Orchestrator::new(
            Arc::new(ScriptedEngine::new(vec![])),
            tools,
            Arc::new(SessionStore::default()),
        );
        build_router(&GatewayConfig::default(), orchestrator)
    }

    #[tokio::test]
    async fn health_endpoint() {
        let response = app()
            .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let response = app()
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let message = "x".repeat(MAX_BODY_BYTES + 1);
        let body = serde_json::json!({ "message": message }).to_string();
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/chat_sync")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/v1/chat_sync")
                    .header("origin", "http://localhost:5001")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:5001"
        );
    }

    #[tokio::test]
    async fn cors_ignores_other_origins() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .header("origin", "http://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.headers().get("access-control-allow-origin").is_none());
    }
}
