use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use makeitmp4_core::{HostCapabilities, SanitizedConfig, TranscoderState};
use serde::Serialize;
use std::sync::Arc;

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error body shared by every API handler.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Host report plus the live engine state.
#[derive(Serialize)]
pub struct EnvironmentResponse {
    #[serde(flatten)]
    pub host: HostCapabilities,
    pub engine: TranscoderState,
    pub engine_name: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

pub async fn get_environment(State(state): State<Arc<AppState>>) -> Json<EnvironmentResponse> {
    let transcoder = state.orchestrator().transcoder();
    Json(EnvironmentResponse {
        host: state.capabilities().clone(),
        engine: transcoder.state(),
        engine_name: transcoder.name().to_string(),
    })
}

/// Prometheus text exposition.
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state).await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
