//! Axum router configuration with middleware.
//!
//! Webhook routes verify the `signature` header inside their handlers
//! (they need the raw body for the HMAC). Middleware: CORS, tracing.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/webhook/post-call", post(handlers::webhook::post_call))
        .route("/webhook/call-start", post(handlers::greeting::call_start))
        .route(
            "/webhook/search-memory",
            post(handlers::search::search_memory),
        )
        .route("/jobs/{conversation_id}", get(handlers::jobs::get_job))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint (no auth required).
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
