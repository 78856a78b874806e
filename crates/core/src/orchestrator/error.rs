//! Errors surfaced by the conversion orchestrator.

use thiserror::Error;

use super::types::{Notice, NoticeKind};
use crate::transcoder::TranscoderError;

/// Why a conversion attempt was rejected or failed.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The declared type is not WebM. The engine was never touched.
    #[error("invalid input type: {declared:?} is not a WebM type")]
    InvalidInputType { declared: String },

    /// No engine source could be initialized.
    #[error("engine initialization failed: {0}")]
    Initialization(#[source] TranscoderError),

    /// Writing the input or running the engine failed.
    #[error("conversion failed: {0}")]
    Execution(#[source] TranscoderError),

    /// The engine finished without producing the output file.
    #[error("engine produced no output: {0}")]
    NotFound(#[source] TranscoderError),

    /// Another attempt is in flight.
    #[error("a conversion is already in progress")]
    Busy,

    /// A converted result is held; reset before converting another file.
    #[error("a converted result is waiting to be downloaded or reset")]
    ResultPending,
}

impl ConversionError {
    /// Classifies an error from the write, run or read stage.
    pub fn from_stage(e: TranscoderError) -> Self {
        if matches!(e, TranscoderError::NotFound { .. }) {
            Self::NotFound(e)
        } else {
            Self::Execution(e)
        }
    }

    /// The message shown to the user, if the error ends an attempt.
    pub fn notice(&self) -> Option<Notice> {
        let kind = match self {
            Self::InvalidInputType { .. } => NoticeKind::InvalidInputType,
            Self::Initialization(e) if e.is_environment_unsupported() => {
                NoticeKind::UnsupportedEnvironment
            }
            Self::Initialization(_) => NoticeKind::LoadFailed,
            Self::Execution(_) | Self::NotFound(_) => NoticeKind::ConversionFailed,
            Self::Busy | Self::ResultPending => return None,
        };
        Some(Notice::new(kind))
    }

    /// Short label used in logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::InvalidInputType { .. } => "invalid_input",
            Self::Initialization(_) => "load_failed",
            Self::Execution(_) => "execution_failed",
            Self::NotFound(_) => "not_found",
            Self::Busy => "busy",
            Self::ResultPending => "result_pending",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcoder::{SourceAttempt, SourceFailure};

    fn init_error(failure: SourceFailure) -> TranscoderError {
        TranscoderError::Initialization {
            attempts: vec![SourceAttempt {
                source: "path".to_string(),
                failure,
            }],
        }
    }

    #[test]
    fn test_from_stage() {
        let err = ConversionError::from_stage(TranscoderError::NotFound {
            name: "output.mp4".to_string(),
        });
        assert!(matches!(err, ConversionError::NotFound(_)));

        let err = ConversionError::from_stage(TranscoderError::execution_failed("exit 1", None));
        assert!(matches!(err, ConversionError::Execution(_)));
    }

    #[test]
    fn test_notice_mapping() {
        let kind = |e: ConversionError| e.notice().map(|n| n.kind);

        assert_eq!(
            kind(ConversionError::InvalidInputType {
                declared: "video/mp4".into()
            }),
            Some(NoticeKind::InvalidInputType)
        );
        assert_eq!(
            kind(ConversionError::Initialization(init_error(
                SourceFailure::Environment("permission denied".into())
            ))),
            Some(NoticeKind::UnsupportedEnvironment)
        );
        assert_eq!(
            kind(ConversionError::Initialization(init_error(
                SourceFailure::Unavailable("missing".into())
            ))),
            Some(NoticeKind::LoadFailed)
        );
        assert_eq!(
            kind(ConversionError::Execution(TranscoderError::Timeout {
                timeout_secs: 5
            })),
            Some(NoticeKind::ConversionFailed)
        );
        assert_eq!(kind(ConversionError::Busy), None);
        assert_eq!(kind(ConversionError::ResultPending), None);
    }
}
