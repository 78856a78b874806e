//! Types for the conversion orchestrator.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transcoder::TranscoderState;

/// Where the current attempt is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    ValidatingInput,
    Loading,
    Converting,
    Succeeded,
    Failed,
}

impl Phase {
    /// Whether an attempt is in flight.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Phase::ValidatingInput | Phase::Loading | Phase::Converting
        )
    }
}

/// A file submitted for conversion.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    /// MIME type declared by the client.
    pub mime_type: String,
    pub bytes: Bytes,
}

impl SourceFile {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// A finished conversion, held until the user starts over.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub id: Uuid,
    /// Download name derived from the source name.
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
    pub created_at: DateTime<Utc>,
}

impl ConversionResult {
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            id: self.id,
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.data.len() as u64,
            created_at: self.created_at,
        }
    }
}

/// Metadata of the held result, without its bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Category of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    InvalidInputType,
    UnsupportedEnvironment,
    LoadFailed,
    ConversionFailed,
    ConversionComplete,
}

/// A message shown to the user after an attempt ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn new(kind: NoticeKind) -> Self {
        let (title, description) = match kind {
            NoticeKind::InvalidInputType => {
                ("Invalid file type", "Please upload a .webm video file.")
            }
            NoticeKind::UnsupportedEnvironment => (
                "Unsupported environment",
                "This server cannot run the video converter. Check the engine installation or use a supported platform.",
            ),
            NoticeKind::LoadFailed => (
                "Error loading converter",
                "Failed to load converter. Please reload the page.",
            ),
            NoticeKind::ConversionFailed => (
                "Conversion failed",
                "An error occurred during conversion. Try again or use a smaller video.",
            ),
            NoticeKind::ConversionComplete => (
                "Conversion complete!",
                "Your video is ready for download.",
            ),
        };

        Self {
            kind,
            title: title.to_string(),
            description: description.to_string(),
        }
    }

    /// Whether the notice reports a failure.
    pub fn is_error(&self) -> bool {
        self.kind != NoticeKind::ConversionComplete
    }
}

/// Snapshot of the orchestrator, published on every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionStatus {
    pub phase: Phase,
    /// Percent complete, 0 to 100.
    pub progress: u8,
    /// Number of attempts started since the process began.
    pub attempt: u64,
    /// Name of the file being (or last) converted.
    pub file_name: Option<String>,
    pub result: Option<ResultSummary>,
    pub notice: Option<Notice>,
    pub engine: TranscoderState,
    pub updated_at: DateTime<Utc>,
}

impl ConversionStatus {
    pub fn idle(engine: TranscoderState) -> Self {
        Self {
            phase: Phase::Idle,
            progress: 0,
            attempt: 0,
            file_name: None,
            result: None,
            notice: None,
            engine,
            updated_at: Utc::now(),
        }
    }
}
