use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::middleware::metrics_middleware;
use super::{conversion, handlers, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let web_dir = state.config().server.web_dir.clone();
    let max_upload_bytes = state.config().server.max_upload_bytes;

    // API routes
    let api_routes = Router::new()
        // Health, config and host report
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/environment", get(handlers::get_environment))
        // Conversion
        .route(
            "/conversion",
            get(conversion::get_status).post(conversion::submit_conversion),
        )
        .route("/conversion/result", get(conversion::download_result))
        .route("/conversion/reset", post(conversion::reset_conversion))
        // Live status
        .route("/ws", get(ws::ws_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    // Serve the page with index fallback
    let serve_dir = ServeDir::new(&web_dir).fallback(ServeFile::new(web_dir.join("index.html")));

    Router::new()
        .route("/metrics", get(handlers::get_metrics))
        .nest("/api/v1", api_routes)
        .fallback_service(serve_dir)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
