//! Trait definitions for the transcoder module.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::error::TranscoderError;
use super::types::{EngineEvent, TranscoderState};

/// A transcoding engine with a private in-memory style filesystem.
///
/// Files are addressed by plain names (`input.webm`), never by host paths.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Returns the name of this transcoder implementation.
    fn name(&self) -> &str;

    /// Current lifecycle state of the engine.
    fn state(&self) -> TranscoderState;

    /// Whether `load` has completed successfully.
    fn is_loaded(&self) -> bool {
        self.state() == TranscoderState::Loaded
    }

    /// Initializes the engine. Idempotent once it has succeeded.
    async fn load(&self) -> Result<(), TranscoderError>;

    /// Stores `bytes` under `name`, replacing any previous file.
    async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<(), TranscoderError>;

    /// Runs the engine with `args` and waits for it to exit.
    ///
    /// Progress and log lines are sent on `events` while it runs. A closed
    /// receiver does not stop the run.
    async fn run(
        &self,
        args: &[String],
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<(), TranscoderError>;

    /// Reads a file produced by a run.
    async fn read_output(&self, name: &str) -> Result<Bytes, TranscoderError>;

    /// Deletes a file. Deleting a missing file is not an error.
    async fn remove_file(&self, name: &str) -> Result<(), TranscoderError>;
}
