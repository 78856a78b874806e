//! FFmpeg-based transcoder implementation.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, OnceCell};
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

use super::config::EngineConfig;
use super::error::TranscoderError;
use super::fetch::{AssetFetcher, FetchError, HttpAssetFetcher};
use super::profile::input_name;
use super::progress::{ProgressLine, ProgressParser};
use super::source::{is_text_file_busy, EngineLoader, ResolvedEngine, TEXT_FILE_BUSY_RETRIES};
use super::traits::Transcoder;
use super::types::{EngineEvent, TranscoderState};

/// Engine output lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// A resolved engine together with its private working directory.
struct LoadedEngine {
    resolved: ResolvedEngine,
    scratch: TempDir,
}

/// Drives FFmpeg executables resolved from the configured sources.
///
/// Each instance owns a scratch directory that plays the role of the engine
/// filesystem. It is created on load and removed on drop.
pub struct FfmpegTranscoder {
    config: EngineConfig,
    loader: EngineLoader,
    engine: OnceCell<LoadedEngine>,
    /// Callers currently inside `load`.
    loading: AtomicUsize,
}

impl FfmpegTranscoder {
    /// Creates a transcoder that downloads remote assets over HTTP.
    pub fn from_config(config: EngineConfig) -> Result<Self, FetchError> {
        let fetcher = HttpAssetFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    /// Creates a transcoder with a custom asset fetcher.
    pub fn with_fetcher(config: EngineConfig, fetcher: Arc<dyn AssetFetcher>) -> Self {
        let loader = EngineLoader::new(config.sources.clone(), fetcher, &config.cache_dir);
        Self {
            config,
            loader,
            engine: OnceCell::new(),
            loading: AtomicUsize::new(0),
        }
    }

    /// The engine in use, once loaded.
    pub fn engine(&self) -> Option<&ResolvedEngine> {
        self.engine.get().map(|e| &e.resolved)
    }

    async fn initialize(&self) -> Result<LoadedEngine, TranscoderError> {
        let resolved = self.loader.resolve().await?;

        tokio::fs::create_dir_all(&self.config.scratch_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("makeitmp4-")
            .tempdir_in(&self.config.scratch_dir)?;

        info!(
            source = %resolved.source,
            scratch = %scratch.path().display(),
            "Engine ready"
        );
        Ok(LoadedEngine { resolved, scratch })
    }

    fn loaded(&self) -> Result<&LoadedEngine, TranscoderError> {
        self.engine.get().ok_or(TranscoderError::NotLoaded)
    }

    /// Maps an engine file name onto the scratch directory.
    fn file_path(&self, name: &str) -> Result<PathBuf, TranscoderError> {
        validate_name(name)?;
        Ok(self.loaded()?.scratch.path().join(name))
    }
}

fn validate_name(name: &str) -> Result<(), TranscoderError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(TranscoderError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn state(&self) -> TranscoderState {
        if self.engine.initialized() {
            TranscoderState::Loaded
        } else if self.loading.load(Ordering::SeqCst) > 0 {
            TranscoderState::Loading
        } else {
            TranscoderState::Unloaded
        }
    }

    async fn load(&self) -> Result<(), TranscoderError> {
        if self.engine.initialized() {
            return Ok(());
        }

        self.loading.fetch_add(1, Ordering::SeqCst);
        let result = self.engine.get_or_try_init(|| self.initialize()).await;
        self.loading.fetch_sub(1, Ordering::SeqCst);

        result.map(|_| ())
    }

    async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<(), TranscoderError> {
        let path = self.file_path(name)?;
        tokio::fs::write(&path, bytes).await?;
        debug!(name = name, bytes = bytes.len(), "Wrote engine input");
        Ok(())
    }

    async fn run(
        &self,
        args: &[String],
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<(), TranscoderError> {
        let engine = self.loaded()?;
        let workdir = engine.scratch.path();

        // Progress needs the input duration; without it only logs are reported.
        let duration_secs = match input_name(args) {
            Some(input) => probe_duration(&engine.resolved.binaries.probe, workdir, input).await,
            None => None,
        };

        let mut command = Command::new(&engine.resolved.binaries.transcoder);
        command
            .args(["-nostdin", "-y", "-hide_banner", "-loglevel"])
            .arg(&self.config.log_level)
            .args(["-progress", "pipe:2", "-nostats"])
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(args = ?args, duration_secs = ?duration_secs, "Starting engine run");
        let mut child = spawn_engine(&mut command).await?;

        let Some(stderr) = child.stderr.take() else {
            return Err(TranscoderError::execution_failed(
                "engine stderr was not captured",
                None,
            ));
        };
        let mut reader = BufReader::new(stderr).split(b'\n');

        let mut parser = ProgressParser::new(duration_secs);
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        let timeout_secs = self.config.run_timeout_secs;
        let result = timeout(Duration::from_secs(timeout_secs), async {
            while let Some(raw) = reader.next_segment().await? {
                // Stream titles and tags are printed in whatever encoding the file uses
                let line = String::from_utf8_lossy(&raw)
                    .trim_end_matches('\r')
                    .to_string();
                match parser.parse_line(&line) {
                    ProgressLine::Progress(fraction) => {
                        // Non-blocking send
                        let _ = events.try_send(EngineEvent::Progress(fraction));
                    }
                    ProgressLine::End => {
                        let _ = events.try_send(EngineEvent::Progress(1.0));
                    }
                    ProgressLine::Ignored => {}
                    ProgressLine::Log => {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line.clone());
                        let _ = events.try_send(EngineEvent::Log(line));
                    }
                }
            }

            child.wait().await
        })
        .await;

        match result {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => {
                let stderr = Vec::from(tail).join("\n");
                Err(TranscoderError::execution_failed(
                    format!("ffmpeg exited with {}", status),
                    (!stderr.is_empty()).then_some(stderr),
                ))
            }
            Ok(Err(e)) => Err(TranscoderError::Io(e)),
            Err(_) => {
                // Kill the process on timeout
                let _ = child.kill().await;
                Err(TranscoderError::Timeout { timeout_secs })
            }
        }
    }

    async fn read_output(&self, name: &str) -> Result<Bytes, TranscoderError> {
        let path = self.file_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(TranscoderError::NotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(TranscoderError::Io(e)),
        }
    }

    async fn remove_file(&self, name: &str) -> Result<(), TranscoderError> {
        let path = self.file_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TranscoderError::Io(e)),
        }
    }
}

async fn spawn_engine(command: &mut Command) -> io::Result<Child> {
    let mut retries = 0;
    loop {
        match command.spawn() {
            Err(e) if is_text_file_busy(&e) && retries < TEXT_FILE_BUSY_RETRIES => {
                retries += 1;
                tokio::time::sleep(Duration::from_millis(20 * retries as u64)).await;
            }
            other => return other,
        }
    }
}

/// ffprobe JSON output (format section only).
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Reads the container duration of `input`, in seconds.
async fn probe_duration(probe: &Path, workdir: &Path, input: &str) -> Option<f64> {
    let output = Command::new(probe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(input)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        debug!(status = %output.status, "ffprobe failed, progress unavailable");
        return None;
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout).ok()?;
    parsed.format.duration?.parse().ok()
}
