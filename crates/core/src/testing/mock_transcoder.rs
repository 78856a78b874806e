//! Mock transcoder for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};

use crate::transcoder::{
    input_name, EngineEvent, SourceAttempt, SourceFailure, Transcoder, TranscoderError,
    TranscoderState,
};

/// Mock implementation of the Transcoder trait.
///
/// Provides controllable behavior for testing:
/// - Count calls per operation for assertions
/// - Simulate load, run and missing-output failures
/// - Emit scripted progress during `run`
/// - Hold `run` open until released, to observe in-flight states
///
/// Files live in a map keyed by name. `run` requires the `-i` input to
/// exist and writes the configured output bytes under the last argument.
///
/// # Example
///
/// ```rust,ignore
/// use makeitmp4_core::testing::MockTranscoder;
///
/// let transcoder = MockTranscoder::new();
/// transcoder.set_run_failure(Some("corrupt input".into())).await;
///
/// // Hold the next run open
/// transcoder.hold();
/// // ... observe Converting ...
/// transcoder.release();
/// ```
#[derive(Debug)]
pub struct MockTranscoder {
    loaded: AtomicBool,
    files: Arc<RwLock<HashMap<String, Bytes>>>,
    recorded_args: Arc<RwLock<Vec<Vec<String>>>>,

    load_failure: Arc<RwLock<Option<SourceFailure>>>,
    run_failure: Arc<RwLock<Option<String>>>,
    progress_script: Arc<RwLock<Vec<f32>>>,
    output: Arc<RwLock<Bytes>>,
    skip_output: AtomicBool,
    held: watch::Sender<bool>,

    load_calls: AtomicUsize,
    write_calls: AtomicUsize,
    run_calls: AtomicUsize,
    read_calls: AtomicUsize,
    remove_calls: AtomicUsize,
}

impl Default for MockTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranscoder {
    /// Creates an unloaded mock that converts successfully.
    pub fn new() -> Self {
        let (held, _) = watch::channel(false);
        Self {
            loaded: AtomicBool::new(false),
            files: Arc::new(RwLock::new(HashMap::new())),
            recorded_args: Arc::new(RwLock::new(Vec::new())),
            load_failure: Arc::new(RwLock::new(None)),
            run_failure: Arc::new(RwLock::new(None)),
            progress_script: Arc::new(RwLock::new(vec![0.5, 1.0])),
            output: Arc::new(RwLock::new(Bytes::from_static(b"mock-mp4"))),
            skip_output: AtomicBool::new(false),
            held,
            load_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
            run_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
        }
    }

    /// Makes every load fail with `failure`, or succeed with `None`.
    pub async fn set_load_failure(&self, failure: Option<SourceFailure>) {
        *self.load_failure.write().await = failure;
    }

    /// Makes every run exit with an error, or succeed with `None`.
    pub async fn set_run_failure(&self, reason: Option<String>) {
        *self.run_failure.write().await = reason;
    }

    /// Progress fractions emitted by each run.
    pub async fn set_progress_script(&self, fractions: Vec<f32>) {
        *self.progress_script.write().await = fractions;
    }

    /// Bytes written as the output of each run.
    pub async fn set_output(&self, bytes: impl Into<Bytes>) {
        *self.output.write().await = bytes.into();
    }

    /// Whether runs should finish without writing an output file.
    pub fn set_skip_output(&self, skip: bool) {
        self.skip_output.store(skip, Ordering::SeqCst);
    }

    /// Blocks runs after their progress events until `release` is called.
    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    /// Lets held runs finish.
    pub fn release(&self) {
        self.held.send_replace(false);
    }

    /// Contents of a file in the mock filesystem.
    pub async fn file(&self, name: &str) -> Option<Bytes> {
        self.files.read().await.get(name).cloned()
    }

    /// Argument vectors of every run, in order.
    pub async fn recorded_args(&self) -> Vec<Vec<String>> {
        self.recorded_args.read().await.clone()
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }

    /// Calls to any operation other than `state`.
    pub fn total_calls(&self) -> usize {
        self.load_calls()
            + self.write_calls()
            + self.run_calls()
            + self.read_calls()
            + self.remove_calls()
    }

    fn ensure_loaded(&self) -> Result<(), TranscoderError> {
        if self.loaded.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TranscoderError::NotLoaded)
        }
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    fn name(&self) -> &str {
        "mock"
    }

    fn state(&self) -> TranscoderState {
        if self.loaded.load(Ordering::SeqCst) {
            TranscoderState::Loaded
        } else {
            TranscoderState::Unloaded
        }
    }

    async fn load(&self) -> Result<(), TranscoderError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.loaded.load(Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(failure) = self.load_failure.read().await.clone() {
            return Err(TranscoderError::Initialization {
                attempts: vec![SourceAttempt {
                    source: "mock".to_string(),
                    failure,
                }],
            });
        }

        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<(), TranscoderError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_loaded()?;
        self.files
            .write()
            .await
            .insert(name.to_string(), Bytes::copy_from_slice(bytes));
        Ok(())
    }

    async fn run(
        &self,
        args: &[String],
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<(), TranscoderError> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_loaded()?;
        self.recorded_args.write().await.push(args.to_vec());

        let input = input_name(args).unwrap_or_default();
        if !self.files.read().await.contains_key(input) {
            return Err(TranscoderError::execution_failed(
                format!("{}: No such file or directory", input),
                None,
            ));
        }

        let script = self.progress_script.read().await.clone();
        for fraction in script {
            let _ = events.send(EngineEvent::Progress(fraction)).await;
        }
        let _ = events
            .send(EngineEvent::Log("mock engine finished encoding".to_string()))
            .await;

        let mut held = self.held.subscribe();
        let _ = held.wait_for(|held| !*held).await;

        if let Some(reason) = self.run_failure.read().await.clone() {
            return Err(TranscoderError::execution_failed(
                reason,
                Some("Conversion failed!".to_string()),
            ));
        }

        if !self.skip_output.load(Ordering::SeqCst) {
            if let Some(output) = args.last() {
                let bytes = self.output.read().await.clone();
                self.files.write().await.insert(output.clone(), bytes);
            }
        }
        Ok(())
    }

    async fn read_output(&self, name: &str) -> Result<Bytes, TranscoderError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_loaded()?;
        self.files
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| TranscoderError::NotFound {
                name: name.to_string(),
            })
    }

    async fn remove_file(&self, name: &str) -> Result<(), TranscoderError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_loaded()?;
        self.files.write().await.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcoder::{webm_to_mp4_args, INPUT_NAME, OUTPUT_NAME};

    #[tokio::test]
    async fn test_mock_round_trip() {
        let transcoder = MockTranscoder::new();
        assert!(!transcoder.is_loaded());
        transcoder.load().await.unwrap();
        assert!(transcoder.is_loaded());

        transcoder.write_input(INPUT_NAME, b"webm").await.unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        transcoder.run(&webm_to_mp4_args(), tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(EngineEvent::Progress(0.5)));
        assert_eq!(
            &transcoder.read_output(OUTPUT_NAME).await.unwrap()[..],
            b"mock-mp4"
        );
        assert_eq!(transcoder.total_calls(), 4);
    }

    #[tokio::test]
    async fn test_mock_requires_input() {
        let transcoder = MockTranscoder::new();
        transcoder.load().await.unwrap();

        let (tx, _rx) = mpsc::channel(16);
        let err = transcoder.run(&webm_to_mp4_args(), tx).await.unwrap_err();
        assert!(matches!(err, TranscoderError::Execution { .. }));
    }
}
