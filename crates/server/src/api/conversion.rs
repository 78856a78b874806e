//! Upload, status, download and reset of the single conversion slot.

use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use makeitmp4_core::orchestrator::DEFAULT_UPLOAD_NAME;
use makeitmp4_core::{ConversionError, ConversionStatus, SourceFile};
use std::sync::Arc;
use tracing::{debug, info};

use super::handlers::ErrorResponse;
use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse::new(message)))
}

fn conversion_error(e: ConversionError) -> ApiError {
    let status = match e {
        ConversionError::Busy | ConversionError::ResultPending => StatusCode::CONFLICT,
        ConversionError::InvalidInputType { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

fn multipart_error(e: MultipartError) -> ApiError {
    api_error(e.status(), e.body_text())
}

/// GET /conversion
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ConversionStatus> {
    Json(state.orchestrator().status())
}

/// POST /conversion
///
/// Multipart form with a `file` part and an optional `type` part that
/// overrides the part's own content type. The slot is reserved before the
/// body is read, so a second upload is turned away without buffering it.
/// Answers 202 and converts in the background.
pub async fn submit_conversion(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ConversionStatus>), ApiError> {
    let orchestrator = Arc::clone(state.orchestrator());
    let reservation = orchestrator.reserve().map_err(conversion_error)?;

    let source = read_upload(multipart).await?;
    info!(
        file_name = %source.name,
        mime_type = %source.mime_type,
        bytes = source.bytes.len(),
        "Received upload"
    );

    let pending = orchestrator.begin(reservation, source);
    let status = orchestrator.status();

    tokio::spawn(async move {
        // Failures are published as status and logged by the orchestrator
        let _ = orchestrator.execute(pending).await;
    });

    Ok((StatusCode::ACCEPTED, Json(status)))
}

async fn read_upload(mut multipart: Multipart) -> Result<SourceFile, ApiError> {
    let mut file = None;
    let mut declared_type: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field
                    .file_name()
                    .filter(|n| !n.is_empty())
                    .unwrap_or(DEFAULT_UPLOAD_NAME)
                    .to_string();
                let content_type = field.content_type().unwrap_or("").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((file_name, content_type, bytes));
            }
            "type" => {
                declared_type = Some(field.text().await.map_err(multipart_error)?);
            }
            other => {
                debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    let (file_name, content_type, bytes) =
        file.ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing 'file' field"))?;

    Ok(SourceFile::new(
        file_name,
        declared_type.unwrap_or(content_type),
        bytes,
    ))
}

/// GET /conversion/result
pub async fn download_result(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let result = state
        .orchestrator()
        .result()
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "No converted file available"))?;

    let headers = [
        (header::CONTENT_TYPE, result.mime_type.clone()),
        (
            header::CONTENT_DISPOSITION,
            content_disposition(&result.file_name),
        ),
    ];
    Ok((headers, Body::from(result.data.clone())).into_response())
}

/// POST /conversion/reset
pub async fn reset_conversion(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConversionStatus>, ApiError> {
    state
        .orchestrator()
        .reset()
        .await
        .map(Json)
        .map_err(conversion_error)
}

/// Attachment header with an ASCII fallback and the exact name in RFC 5987 form.
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}
