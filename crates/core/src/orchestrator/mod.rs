//! Conversion orchestrator.
//!
//! Sequences one WebM to MP4 conversion at a time through a `Transcoder`,
//! publishes status snapshots on a watch channel and holds the finished
//! result until the caller resets.

mod error;
mod naming;
mod runner;
mod types;

pub use error::ConversionError;
pub use naming::{is_webm_type, output_file_name, DEFAULT_UPLOAD_NAME};
pub use runner::{ConversionOrchestrator, PendingConversion, Reservation};
pub use types::{
    ConversionResult, ConversionStatus, Notice, NoticeKind, Phase, ResultSummary, SourceFile,
};
