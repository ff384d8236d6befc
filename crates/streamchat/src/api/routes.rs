//! API route definitions.

use axum::http::{HeaderValue, Method, header};
use axum::{Router, routing::get};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.cors_origins);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route(
            "/chatStream",
            get(handlers::chat_stream_get).post(handlers::chat_stream_post),
        )
        .route(
            "/agentStream",
            get(handlers::agent_stream_get).post(handlers::agent_stream_post),
        )
        .route("/sessions/{session_id}/turns", get(handlers::session_turns))
        .route("/health", get(handlers::health))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let headers = [header::CONTENT_TYPE, header::CACHE_CONTROL, header::ACCEPT];

    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(AllowOrigin::any())
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("CORS: Invalid origin in config: {}", origin);
                None
            })
        })
        .collect();

    if origins.is_empty() {
        tracing::error!("CORS: All configured origins are invalid!");
        CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_static("null")))
    } else {
        tracing::info!("CORS: Allowing {} origin(s)", origins.len());
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
    }
}
