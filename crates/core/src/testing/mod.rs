//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the engine-facing traits,
//! allowing the orchestrator and the HTTP layer to be tested without FFmpeg.
//!
//! # Example
//!
//! ```rust,ignore
//! use makeitmp4_core::testing::{fixtures, MockTranscoder};
//! use makeitmp4_core::orchestrator::ConversionOrchestrator;
//!
//! let transcoder = Arc::new(MockTranscoder::new());
//! transcoder.set_progress_script(vec![0.25, 0.5, 1.0]).await;
//!
//! let orchestrator = ConversionOrchestrator::new(transcoder.clone());
//! orchestrator.convert(fixtures::webm_source("clip.webm")).await?;
//! assert_eq!(transcoder.load_calls(), 1);
//! ```

#[cfg(unix)]
pub mod fake_engine;
mod mock_fetcher;
mod mock_transcoder;

pub use mock_fetcher::MockAssetFetcher;
pub use mock_transcoder::MockTranscoder;

/// Test fixtures and helper functions.
pub mod fixtures {
    use bytes::Bytes;

    use crate::orchestrator::SourceFile;

    /// EBML magic followed by filler; enough for anything that sniffs headers.
    pub const WEBM_BYTES: &[u8] = b"\x1a\x45\xdf\xa3fake-webm-payload";

    /// A WebM upload with the given name.
    pub fn webm_source(name: &str) -> SourceFile {
        source_with_type(name, "video/webm")
    }

    /// An upload with an arbitrary declared type.
    pub fn source_with_type(name: &str, mime_type: &str) -> SourceFile {
        SourceFile::new(name, mime_type, Bytes::from_static(WEBM_BYTES))
    }
}
