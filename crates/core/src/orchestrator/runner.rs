//! Conversion orchestrator implementation.
//!
//! Sequences a single attempt through the engine:
//! validate → load (if needed) → write → run → read → publish.
//! Exactly one attempt may be in flight; the result of a successful attempt is
//! held until the caller resets.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics::{CONVERSIONS_TOTAL, CONVERSION_DURATION};
use crate::transcoder::{
    webm_to_mp4_args, EngineEvent, Transcoder, TranscoderError, INPUT_NAME, OUTPUT_MIME_TYPE,
    OUTPUT_NAME,
};

use super::error::ConversionError;
use super::naming::{is_webm_type, output_file_name};
use super::types::{
    ConversionResult, ConversionStatus, Notice, NoticeKind, Phase, ResultSummary, SourceFile,
};

/// Engine events buffered between the engine and the status.
const EVENT_BUFFER: usize = 64;

/// Ownership of the single in-flight slot.
///
/// Dropping it without starting an attempt frees the slot again.
pub struct Reservation {
    _guard: OwnedMutexGuard<()>,
}

/// An attempt that has been announced but not yet executed.
pub struct PendingConversion {
    _reservation: Reservation,
    attempt: u64,
    source: SourceFile,
    started: Instant,
}

impl PendingConversion {
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn file_name(&self) -> &str {
        &self.source.name
    }
}

/// Drives WebM to MP4 conversions through an injected transcoder.
pub struct ConversionOrchestrator {
    transcoder: Arc<dyn Transcoder>,
    status_tx: watch::Sender<ConversionStatus>,
    in_flight: Arc<Mutex<()>>,
    result: RwLock<Option<Arc<ConversionResult>>>,
}

impl ConversionOrchestrator {
    /// Creates an idle orchestrator that owns the given transcoder handle.
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        let (status_tx, _) = watch::channel(ConversionStatus::idle(transcoder.state()));

        Self {
            transcoder,
            status_tx,
            in_flight: Arc::new(Mutex::new(())),
            result: RwLock::new(None),
        }
    }

    /// The transcoder this orchestrator drives.
    pub fn transcoder(&self) -> &Arc<dyn Transcoder> {
        &self.transcoder
    }

    /// Current status, with the live engine state.
    pub fn status(&self) -> ConversionStatus {
        let mut status = self.status_tx.borrow().clone();
        status.engine = self.transcoder.state();
        status
    }

    /// Subscribes to status snapshots.
    pub fn subscribe(&self) -> watch::Receiver<ConversionStatus> {
        self.status_tx.subscribe()
    }

    /// The held result of the last successful attempt.
    pub async fn result(&self) -> Option<Arc<ConversionResult>> {
        self.result.read().await.clone()
    }

    /// Loads the engine ahead of the first conversion.
    pub async fn preload(&self) -> Result<(), TranscoderError> {
        let result = self.transcoder.load().await;
        // Refresh the published engine state.
        self.publish(|_| {});
        result
    }

    /// Claims the in-flight slot without waiting.
    pub fn reserve(&self) -> Result<Reservation, ConversionError> {
        let guard = Arc::clone(&self.in_flight)
            .try_lock_owned()
            .map_err(|_| ConversionError::Busy)?;

        if self.status_tx.borrow().phase == Phase::Succeeded {
            return Err(ConversionError::ResultPending);
        }

        Ok(Reservation { _guard: guard })
    }

    /// Starts a new attempt and publishes `ValidatingInput`.
    pub fn begin(&self, reservation: Reservation, source: SourceFile) -> PendingConversion {
        let mut attempt = 0;
        self.publish(|status| {
            status.attempt += 1;
            attempt = status.attempt;
            status.phase = Phase::ValidatingInput;
            status.progress = 0;
            status.file_name = Some(source.name.clone());
            status.result = None;
            status.notice = None;
        });

        info!(
            attempt = attempt,
            file_name = %source.name,
            mime_type = %source.mime_type,
            size_bytes = source.bytes.len(),
            "Conversion submitted"
        );

        PendingConversion {
            _reservation: reservation,
            attempt,
            source,
            started: Instant::now(),
        }
    }

    /// Runs a started attempt to its terminal state.
    ///
    /// The in-flight slot is released only after `Succeeded` or `Failed` has
    /// been published.
    pub async fn execute(&self, pending: PendingConversion) -> Result<ResultSummary, ConversionError> {
        let attempt = pending.attempt;
        let outcome = self.run_attempt(attempt, &pending.source).await;
        let elapsed = pending.started.elapsed().as_secs_f64();

        match outcome {
            Ok(result) => {
                let summary = result.summary();
                *self.result.write().await = Some(Arc::new(result));

                self.publish(|status| {
                    status.phase = Phase::Succeeded;
                    status.progress = 100;
                    status.result = Some(summary.clone());
                    status.notice = Some(Notice::new(NoticeKind::ConversionComplete));
                });

                CONVERSIONS_TOTAL.with_label_values(&["success"]).inc();
                CONVERSION_DURATION
                    .with_label_values(&["success"])
                    .observe(elapsed);
                info!(
                    attempt = attempt,
                    file_name = %summary.file_name,
                    size_bytes = summary.size_bytes,
                    elapsed_secs = elapsed,
                    "Conversion complete"
                );
                Ok(summary)
            }
            Err(e) => {
                self.publish(|status| {
                    status.phase = Phase::Failed;
                    status.progress = 0;
                    status.result = None;
                    status.notice = e.notice();
                });

                CONVERSIONS_TOTAL.with_label_values(&[e.outcome()]).inc();
                CONVERSION_DURATION
                    .with_label_values(&[e.outcome()])
                    .observe(elapsed);
                error!(
                    attempt = attempt,
                    file_name = %pending.source.name,
                    error = %e,
                    detail = ?e,
                    "Conversion failed"
                );
                Err(e)
            }
        }
    }

    /// Reserves, begins and executes an attempt.
    pub async fn convert(&self, source: SourceFile) -> Result<ResultSummary, ConversionError> {
        let reservation = self.reserve()?;
        let pending = self.begin(reservation, source);
        self.execute(pending).await
    }

    /// Releases the held result and returns to `Idle`.
    pub async fn reset(&self) -> Result<ConversionStatus, ConversionError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| ConversionError::Busy)?;

        let released = self.result.write().await.take();
        if let Some(result) = released {
            info!(
                id = %result.id,
                file_name = %result.file_name,
                "Released conversion result"
            );
        }

        self.publish(|status| {
            status.phase = Phase::Idle;
            status.progress = 0;
            status.file_name = None;
            status.result = None;
            status.notice = None;
        });

        Ok(self.status())
    }

    /// Merges an engine progress report into the status.
    ///
    /// Applied only while `attempt` is the current attempt and is
    /// `Converting`, and only if it raises the percentage. Returns whether the
    /// status changed.
    pub fn apply_progress(&self, attempt: u64, fraction: f32) -> bool {
        let percent = progress_percent(fraction);
        self.status_tx.send_if_modified(|status| {
            if status.attempt != attempt
                || status.phase != Phase::Converting
                || percent <= status.progress
            {
                return false;
            }
            status.progress = percent;
            status.updated_at = Utc::now();
            true
        })
    }

    async fn run_attempt(
        &self,
        attempt: u64,
        source: &SourceFile,
    ) -> Result<ConversionResult, ConversionError> {
        if !is_webm_type(&source.mime_type) {
            warn!(
                attempt = attempt,
                mime_type = %source.mime_type,
                "Rejected non-WebM input"
            );
            return Err(ConversionError::InvalidInputType {
                declared: source.mime_type.clone(),
            });
        }

        if !self.transcoder.is_loaded() {
            self.publish(|status| status.phase = Phase::Loading);
            info!(attempt = attempt, engine = self.transcoder.name(), "Loading engine");
            self.transcoder
                .load()
                .await
                .map_err(ConversionError::Initialization)?;
        }

        self.publish(|status| {
            status.phase = Phase::Converting;
            status.progress = 0;
        });

        // A stale output from an earlier run must not pass for this one.
        self.transcoder
            .remove_file(OUTPUT_NAME)
            .await
            .map_err(ConversionError::from_stage)?;
        self.transcoder
            .write_input(INPUT_NAME, &source.bytes)
            .await
            .map_err(ConversionError::from_stage)?;

        self.drive_run(attempt).await?;

        let data = self
            .transcoder
            .read_output(OUTPUT_NAME)
            .await
            .map_err(ConversionError::from_stage)?;

        Ok(ConversionResult {
            id: Uuid::new_v4(),
            file_name: output_file_name(&source.name),
            mime_type: OUTPUT_MIME_TYPE.to_string(),
            data,
            created_at: Utc::now(),
        })
    }

    /// Runs the engine while applying its events in the same task.
    ///
    /// The receiver is dropped before the caller publishes a terminal state,
    /// so no event can arrive after it.
    async fn drive_run(&self, attempt: u64) -> Result<(), ConversionError> {
        let (events_tx, mut events_rx) = mpsc::channel(EVENT_BUFFER);
        let args = webm_to_mp4_args();

        let run = self.transcoder.run(&args, events_tx);
        tokio::pin!(run);

        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                Some(event) = events_rx.recv() => self.handle_event(attempt, event),
            }
        };

        // Events sent just before the engine exited.
        while let Ok(event) = events_rx.try_recv() {
            self.handle_event(attempt, event);
        }

        result.map_err(ConversionError::from_stage)
    }

    fn handle_event(&self, attempt: u64, event: EngineEvent) {
        match event {
            EngineEvent::Progress(fraction) => {
                self.apply_progress(attempt, fraction);
            }
            EngineEvent::Log(line) => debug!(attempt = attempt, line = %line, "Engine output"),
        }
    }

    fn publish(&self, update: impl FnOnce(&mut ConversionStatus)) {
        let engine = self.transcoder.state();
        self.status_tx.send_modify(|status| {
            update(status);
            status.engine = engine;
            status.updated_at = Utc::now();
        });
    }
}

/// Converts an engine fraction to a whole percentage in 0..=100.
fn progress_percent(fraction: f32) -> u8 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{source_with_type, webm_source};
    use crate::testing::MockTranscoder;
    use crate::transcoder::{SourceFailure, TranscoderState};
    use std::time::Duration;

    fn orchestrator() -> (Arc<MockTranscoder>, Arc<ConversionOrchestrator>) {
        let transcoder = Arc::new(MockTranscoder::new());
        let orchestrator = Arc::new(ConversionOrchestrator::new(transcoder.clone()));
        (transcoder, orchestrator)
    }

    async fn wait_for(
        orchestrator: &ConversionOrchestrator,
        predicate: impl FnMut(&ConversionStatus) -> bool,
    ) {
        let mut rx = orchestrator.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
            .await
            .expect("timed out waiting for status")
            .expect("status channel closed");
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0.0), 0);
        assert_eq!(progress_percent(0.424), 42);
        assert_eq!(progress_percent(1.7), 100);
        assert_eq!(progress_percent(-0.5), 0);
        assert_eq!(progress_percent(f32::NAN), 0);
        assert_eq!(progress_percent(f32::INFINITY), 0);
    }

    #[tokio::test]
    async fn test_successful_conversion() {
        let (transcoder, orchestrator) = orchestrator();
        transcoder.set_output(b"mp4-bytes".to_vec()).await;

        let summary = orchestrator.convert(webm_source("Holiday.WebM")).await.unwrap();
        assert_eq!(summary.file_name, "Holiday.mp4");
        assert_eq!(summary.mime_type, "video/mp4");
        assert_eq!(summary.size_bytes, 9);

        let status = orchestrator.status();
        assert_eq!(status.phase, Phase::Succeeded);
        assert_eq!(status.progress, 100);
        assert_eq!(status.attempt, 1);
        assert_eq!(status.engine, TranscoderState::Loaded);
        assert_eq!(status.result, Some(summary));
        assert_eq!(
            status.notice.map(|n| n.kind),
            Some(NoticeKind::ConversionComplete)
        );

        let result = orchestrator.result().await.unwrap();
        assert_eq!(&result.data[..], b"mp4-bytes");

        assert_eq!(transcoder.recorded_args().await, vec![webm_to_mp4_args()]);
        assert_eq!(
            transcoder.file(INPUT_NAME).await.unwrap(),
            webm_source("x.webm").bytes
        );
    }

    #[tokio::test]
    async fn test_invalid_type_never_touches_transcoder() {
        let (transcoder, orchestrator) = orchestrator();

        for declared in ["video/mp4", "", "video/WEBM", "application/octet-stream"] {
            let err = orchestrator
                .convert(source_with_type("clip.webm", declared))
                .await
                .unwrap_err();
            assert!(matches!(err, ConversionError::InvalidInputType { .. }));

            let status = orchestrator.status();
            assert_eq!(status.phase, Phase::Failed);
            assert_eq!(status.progress, 0);
            assert_eq!(
                status.notice.map(|n| n.kind),
                Some(NoticeKind::InvalidInputType)
            );
        }

        assert_eq!(transcoder.total_calls(), 0);
        assert_eq!(orchestrator.status().attempt, 4);
    }

    #[tokio::test]
    async fn test_load_failure_skips_conversion() {
        let (transcoder, orchestrator) = orchestrator();
        transcoder
            .set_load_failure(Some(SourceFailure::Unavailable("no engine".into())))
            .await;

        let err = orchestrator.convert(webm_source("clip.webm")).await.unwrap_err();
        assert!(matches!(err, ConversionError::Initialization(_)));

        let status = orchestrator.status();
        assert_eq!(status.phase, Phase::Failed);
        assert_eq!(status.engine, TranscoderState::Unloaded);
        assert_eq!(status.notice.map(|n| n.kind), Some(NoticeKind::LoadFailed));
        assert_eq!(transcoder.write_calls(), 0);
        assert_eq!(transcoder.run_calls(), 0);
    }

    #[tokio::test]
    async fn test_environment_failure_notice() {
        let (transcoder, orchestrator) = orchestrator();
        transcoder
            .set_load_failure(Some(SourceFailure::Environment("exec format error".into())))
            .await;

        orchestrator.convert(webm_source("clip.webm")).await.unwrap_err();
        assert_eq!(
            orchestrator.status().notice.map(|n| n.kind),
            Some(NoticeKind::UnsupportedEnvironment)
        );
    }

    #[tokio::test]
    async fn test_failed_load_can_be_retried() {
        let (transcoder, orchestrator) = orchestrator();
        transcoder
            .set_load_failure(Some(SourceFailure::Unavailable("offline".into())))
            .await;
        orchestrator.convert(webm_source("clip.webm")).await.unwrap_err();

        transcoder.set_load_failure(None).await;
        orchestrator.convert(webm_source("clip.webm")).await.unwrap();

        assert_eq!(transcoder.load_calls(), 2);
        assert_eq!(orchestrator.status().phase, Phase::Succeeded);
    }

    #[tokio::test]
    async fn test_execution_failure() {
        let (transcoder, orchestrator) = orchestrator();
        transcoder.set_run_failure(Some("corrupt input".into())).await;

        let err = orchestrator.convert(webm_source("clip.webm")).await.unwrap_err();
        assert!(matches!(err, ConversionError::Execution(_)));

        let status = orchestrator.status();
        assert_eq!(status.phase, Phase::Failed);
        assert_eq!(status.progress, 0);
        assert!(status.result.is_none());
        assert_eq!(
            status.notice.map(|n| n.kind),
            Some(NoticeKind::ConversionFailed)
        );
        assert!(orchestrator.result().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_output_is_not_found() {
        let (transcoder, orchestrator) = orchestrator();
        transcoder.set_skip_output(true);

        let err = orchestrator.convert(webm_source("clip.webm")).await.unwrap_err();
        assert!(matches!(err, ConversionError::NotFound(_)));
        assert_eq!(
            orchestrator.status().notice.map(|n| n.kind),
            Some(NoticeKind::ConversionFailed)
        );
    }

    #[tokio::test]
    async fn test_stale_output_is_removed_before_run() {
        let (transcoder, orchestrator) = orchestrator();
        orchestrator.convert(webm_source("first.webm")).await.unwrap();
        orchestrator.reset().await.unwrap();

        transcoder.set_skip_output(true);
        let err = orchestrator.convert(webm_source("second.webm")).await.unwrap_err();
        assert!(matches!(err, ConversionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_engine_loaded_once_across_conversions() {
        let (transcoder, orchestrator) = orchestrator();

        orchestrator.convert(webm_source("one.webm")).await.unwrap();
        orchestrator.reset().await.unwrap();
        orchestrator.convert(webm_source("two.webm")).await.unwrap();

        assert_eq!(transcoder.load_calls(), 1);
        assert_eq!(transcoder.run_calls(), 2);
        assert_eq!(orchestrator.status().attempt, 2);
    }

    #[tokio::test]
    async fn test_result_pending_until_reset() {
        let (_transcoder, orchestrator) = orchestrator();
        orchestrator.convert(webm_source("clip.webm")).await.unwrap();

        let err = orchestrator.convert(webm_source("again.webm")).await.unwrap_err();
        assert!(matches!(err, ConversionError::ResultPending));
        // The rejected submission leaves the held result alone.
        assert_eq!(orchestrator.status().phase, Phase::Succeeded);

        let held = orchestrator.result().await.unwrap();
        let status = orchestrator.reset().await.unwrap();
        assert_eq!(status.phase, Phase::Idle);
        assert_eq!(status.progress, 0);
        assert!(status.file_name.is_none());
        assert!(status.notice.is_none());
        assert!(orchestrator.result().await.is_none());
        // Only the test still references the released result.
        assert_eq!(Arc::strong_count(&held), 1);

        orchestrator.convert(webm_source("again.webm")).await.unwrap();
    }

    #[tokio::test]
    async fn test_resubmit_after_failure() {
        let (transcoder, orchestrator) = orchestrator();
        transcoder.set_run_failure(Some("boom".into())).await;
        orchestrator.convert(webm_source("clip.webm")).await.unwrap_err();

        transcoder.set_run_failure(None).await;
        orchestrator.convert(webm_source("clip.webm")).await.unwrap();
        assert_eq!(orchestrator.status().phase, Phase::Succeeded);
    }

    #[tokio::test]
    async fn test_reset_after_failure() {
        let (transcoder, orchestrator) = orchestrator();
        transcoder.set_run_failure(Some("boom".into())).await;
        orchestrator.convert(webm_source("clip.webm")).await.unwrap_err();

        let status = orchestrator.reset().await.unwrap();
        assert_eq!(status.phase, Phase::Idle);
        assert_eq!(status.attempt, 1);
    }

    #[tokio::test]
    async fn test_busy_while_in_flight() {
        let (transcoder, orchestrator) = orchestrator();
        transcoder.hold();

        let task = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.convert(webm_source("clip.webm")).await })
        };
        wait_for(&orchestrator, |s| s.phase == Phase::Converting).await;

        assert!(matches!(
            orchestrator.reserve(),
            Err(ConversionError::Busy)
        ));
        assert!(matches!(
            orchestrator.convert(webm_source("other.webm")).await,
            Err(ConversionError::Busy)
        ));
        assert!(matches!(
            orchestrator.reset().await,
            Err(ConversionError::Busy)
        ));

        transcoder.release();
        task.await.unwrap().unwrap();
        assert_eq!(orchestrator.status().phase, Phase::Succeeded);
        assert_eq!(transcoder.run_calls(), 1);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_ignored_after_terminal_state() {
        let (transcoder, orchestrator) = orchestrator();
        transcoder.set_progress_script(vec![0.2, 0.1, 0.7]).await;
        transcoder.hold();

        let task = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.convert(webm_source("clip.webm")).await })
        };
        wait_for(&orchestrator, |s| s.phase == Phase::Converting && s.progress == 70).await;

        let attempt = orchestrator.status().attempt;
        assert!(!orchestrator.apply_progress(attempt, 0.5));
        assert!(orchestrator.apply_progress(attempt, 0.9));
        assert!(!orchestrator.apply_progress(attempt + 1, 0.95));
        assert_eq!(orchestrator.status().progress, 90);

        transcoder.release();
        task.await.unwrap().unwrap();

        // A report arriving after the terminal transition changes nothing.
        assert!(!orchestrator.apply_progress(attempt, 0.99));
        let status = orchestrator.status();
        assert_eq!(status.phase, Phase::Succeeded);
        assert_eq!(status.progress, 100);
    }

    #[tokio::test]
    async fn test_unreserved_slot_is_released() {
        let (_transcoder, orchestrator) = orchestrator();

        let reservation = orchestrator.reserve().unwrap();
        assert!(matches!(orchestrator.reserve(), Err(ConversionError::Busy)));
        drop(reservation);

        assert!(orchestrator.reserve().is_ok());
        assert_eq!(orchestrator.status().phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_preload_refreshes_engine_state() {
        let (transcoder, orchestrator) = orchestrator();
        let rx = orchestrator.subscribe();
        assert_eq!(rx.borrow().engine, TranscoderState::Unloaded);

        orchestrator.preload().await.unwrap();
        assert_eq!(rx.borrow().engine, TranscoderState::Loaded);
        assert_eq!(transcoder.load_calls(), 1);

        orchestrator.convert(webm_source("clip.webm")).await.unwrap();
        assert_eq!(transcoder.load_calls(), 1);
    }
}
