//! Error types for the transcoder module.

use std::fmt;
use thiserror::Error;

use super::fetch::FetchError;

/// Why a single engine source could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceFailure {
    /// The engine assets are not present at this source.
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// Downloading an asset failed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The host cannot execute the engine (wrong format, no permission).
    #[error("unsupported environment: {0}")]
    Environment(String),

    /// The engine started but failed its self-check.
    #[error("engine self-check failed: {0}")]
    Engine(String),

    /// Local filesystem error while preparing the engine.
    #[error("I/O error: {0}")]
    Io(String),
}

impl SourceFailure {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Fetch(_) => "fetch",
            Self::Environment(_) => "environment",
            Self::Engine(_) => "engine",
            Self::Io(_) => "io",
        }
    }
}

/// One failed source during engine initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAttempt {
    /// Display label of the source.
    pub source: String,
    /// Classified reason for the failure.
    pub failure: SourceFailure,
}

impl fmt::Display for SourceAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.source, self.failure)
    }
}

/// Errors that can occur while driving the transcoding engine.
#[derive(Debug, Error)]
pub enum TranscoderError {
    /// An operation that needs a loaded engine was called before `load`.
    #[error("engine is not loaded")]
    NotLoaded,

    /// Every configured source failed to initialize.
    #[error("engine initialization failed after {} attempt(s): {}", .attempts.len(), format_attempts(.attempts))]
    Initialization { attempts: Vec<SourceAttempt> },

    /// The engine ran but reported a failure.
    #[error("engine execution failed: {reason}")]
    Execution {
        reason: String,
        stderr: Option<String>,
    },

    /// The engine run exceeded the configured timeout.
    #[error("engine run timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The engine did not produce the requested file.
    #[error("file not found in engine filesystem: {name}")]
    NotFound { name: String },

    /// File names must be plain names inside the engine filesystem.
    #[error("invalid engine file name: {name:?}")]
    InvalidName { name: String },

    /// I/O error in the engine filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_attempts(attempts: &[SourceAttempt]) -> String {
    if attempts.is_empty() {
        return "no sources configured".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl TranscoderError {
    /// Creates a new execution error with captured engine output.
    pub fn execution_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
            stderr,
        }
    }

    /// Whether initialization failed because the host cannot run the engine.
    ///
    /// Decided by the last attempted source, which is the failure the user
    /// ends up facing.
    pub fn is_environment_unsupported(&self) -> bool {
        match self {
            Self::Initialization { attempts } => matches!(
                attempts.last().map(|a| &a.failure),
                Some(SourceFailure::Environment(_))
            ),
            _ => false,
        }
    }
}
