//! HTTP server assembly.

use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::warn;

use crate::config::ServerConfig;
use crate::handlers;
use crate::session::ChatService;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn build_app(state: AppState, server: &ServerConfig) -> Router {
    let api_routes = Router::new()
        .route("/session", post(handlers::create_session))
        .route(
            "/messages",
            get(handlers::get_messages).post(handlers::send_message),
        )
        .route("/config", get(handlers::server_info))
        .with_state(state.clone())
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_seconds,
        )))
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB
        .layer(cors_layer(&server.cors_origins));

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .with_state(state)
        .merge(api_routes)
}

/// Widget embeds run cross-origin, so the API defaults to a permissive
/// policy when no explicit origins are configured.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(parsed))
}
