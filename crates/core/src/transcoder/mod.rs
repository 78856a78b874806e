//! Transcoder module: the engine that turns WebM into MP4.
//!
//! The engine is FFmpeg, run as an external process. Its executables are
//! resolved from an ordered list of sources (`PATH`, a local directory, a
//! remote mirror) and verified with a self-check before first use. Each
//! loaded engine works inside a private scratch directory, addressed by
//! plain file names.
//!
//! # Example
//!
//! ```ignore
//! use makeitmp4_core::transcoder::{
//!     webm_to_mp4_args, EngineConfig, FfmpegTranscoder, Transcoder, INPUT_NAME, OUTPUT_NAME,
//! };
//!
//! let transcoder = FfmpegTranscoder::from_config(EngineConfig::default())?;
//! transcoder.load().await?;
//!
//! transcoder.write_input(INPUT_NAME, &webm_bytes).await?;
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! transcoder.run(&webm_to_mp4_args(), tx).await?;
//! let mp4 = transcoder.read_output(OUTPUT_NAME).await?;
//! ```

mod config;
mod environment;
mod error;
mod fetch;
mod ffmpeg;
mod profile;
mod progress;
mod source;
mod traits;
mod types;

pub use config::EngineConfig;
pub use environment::HostCapabilities;
pub use error::{SourceAttempt, SourceFailure, TranscoderError};
pub use fetch::{AssetFetcher, FetchError, HttpAssetFetcher};
pub use ffmpeg::FfmpegTranscoder;
pub use profile::{
    input_name, webm_to_mp4_args, Mp4Profile, INPUT_NAME, OUTPUT_MIME_TYPE, OUTPUT_NAME,
    WEBM_TO_MP4,
};
pub use progress::{ProgressLine, ProgressParser};
pub use source::{
    EngineBinaries, EngineLoader, EngineSource, ResolvedEngine, PROBE_ASSET, TRANSCODER_ASSET,
};
pub use traits::Transcoder;
pub use types::{EngineEvent, TranscoderState};
