//! Engine sources and the ordered fallback loader.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::error::{SourceAttempt, SourceFailure, TranscoderError};
use super::fetch::AssetFetcher;
use crate::metrics::ENGINE_LOAD_ATTEMPTS;

/// File name of the transcoder executable.
pub const TRANSCODER_ASSET: &str = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };

/// File name of the probe executable.
pub const PROBE_ASSET: &str = if cfg!(windows) { "ffprobe.exe" } else { "ffprobe" };

/// Retries for spawning an executable that was just written.
pub(crate) const TEXT_FILE_BUSY_RETRIES: u32 = 5;

/// A candidate location of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineSource {
    /// Executables found on `PATH`.
    Path,
    /// A directory containing both executables.
    Local { dir: PathBuf },
    /// A base URL serving both executables.
    Remote { base_url: String },
}

impl EngineSource {
    /// Short label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Local { .. } => "local",
            Self::Remote { .. } => "remote",
        }
    }
}

impl fmt::Display for EngineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path => write!(f, "path"),
            Self::Local { dir } => write!(f, "local:{}", dir.display()),
            Self::Remote { base_url } => write!(f, "remote:{}", redact_userinfo(base_url)),
        }
    }
}

/// Replaces `user:password@` in a URL authority with `***@`.
fn redact_userinfo(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}://***{}", scheme, &rest[at..]),
        None => url.to_string(),
    }
}

/// Paths of the two engine executables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineBinaries {
    /// Runs the transcode.
    pub transcoder: PathBuf,
    /// Reads stream metadata (duration, codecs).
    pub probe: PathBuf,
}

impl EngineBinaries {
    /// Both executables inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            transcoder: dir.join(TRANSCODER_ASSET),
            probe: dir.join(PROBE_ASSET),
        }
    }
}

/// An engine that passed its self-check.
#[derive(Debug, Clone)]
pub struct ResolvedEngine {
    /// Label of the source it came from.
    pub source: String,
    pub binaries: EngineBinaries,
    /// First line of `ffmpeg -version`.
    pub version: String,
}

/// Tries engine sources in order until one initializes.
pub struct EngineLoader {
    sources: Vec<EngineSource>,
    fetcher: Arc<dyn AssetFetcher>,
    cache_dir: PathBuf,
}

impl EngineLoader {
    /// Creates a loader over `sources`, caching remote assets under `cache_dir`.
    pub fn new(
        sources: Vec<EngineSource>,
        fetcher: Arc<dyn AssetFetcher>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sources,
            fetcher,
            cache_dir: cache_dir.into(),
        }
    }

    /// The configured sources, in resolution order.
    pub fn sources(&self) -> &[EngineSource] {
        &self.sources
    }

    /// Resolves the first working source.
    ///
    /// Each failed source is logged and recorded; if none works the error
    /// carries every attempt in order.
    pub async fn resolve(&self) -> Result<ResolvedEngine, TranscoderError> {
        let mut attempts = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            info!(source = %source, "Trying engine source");

            match self.try_source(source).await {
                Ok(engine) => {
                    ENGINE_LOAD_ATTEMPTS
                        .with_label_values(&[source.kind(), "success"])
                        .inc();
                    info!(source = %source, version = %engine.version, "Engine loaded");
                    return Ok(engine);
                }
                Err(failure) => {
                    ENGINE_LOAD_ATTEMPTS
                        .with_label_values(&[source.kind(), failure.kind()])
                        .inc();
                    warn!(source = %source, error = %failure, "Engine source failed");
                    attempts.push(SourceAttempt {
                        source: source.to_string(),
                        failure,
                    });
                }
            }
        }

        Err(TranscoderError::Initialization { attempts })
    }

    async fn try_source(&self, source: &EngineSource) -> Result<ResolvedEngine, SourceFailure> {
        let binaries = self.materialize(source).await?;
        let version = self_check(&binaries.transcoder).await?;
        self_check(&binaries.probe).await?;

        Ok(ResolvedEngine {
            source: source.to_string(),
            binaries,
            version,
        })
    }

    /// Makes both executables available on local disk.
    async fn materialize(&self, source: &EngineSource) -> Result<EngineBinaries, SourceFailure> {
        match source {
            EngineSource::Path => {
                let lookup = |name: &str| {
                    which::which(name).map_err(|e| {
                        SourceFailure::Unavailable(format!("{} not found on PATH: {}", name, e))
                    })
                };
                Ok(EngineBinaries {
                    transcoder: lookup(TRANSCODER_ASSET)?,
                    probe: lookup(PROBE_ASSET)?,
                })
            }
            EngineSource::Local { dir } => {
                let binaries = EngineBinaries::in_dir(dir);
                for path in [&binaries.transcoder, &binaries.probe] {
                    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                        return Err(SourceFailure::Unavailable(format!(
                            "{} does not exist",
                            path.display()
                        )));
                    }
                }
                Ok(binaries)
            }
            EngineSource::Remote { base_url } => self.download(base_url).await,
        }
    }

    /// Downloads both assets into a cache directory keyed by the base URL.
    async fn download(&self, base_url: &str) -> Result<EngineBinaries, SourceFailure> {
        let dir = self.cache_dir.join(cache_key(base_url));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SourceFailure::Io(format!("{}: {}", dir.display(), e)))?;

        let base = base_url.trim_end_matches('/');
        for asset in [TRANSCODER_ASSET, PROBE_ASSET] {
            let url = format!("{}/{}", base, asset);
            let body = self.fetcher.fetch(&url).await?;
            install_executable(&dir, asset, &body)
                .await
                .map_err(|e| SourceFailure::Io(format!("installing {}: {}", asset, e)))?;
            debug!(asset = asset, bytes = body.len(), "Installed engine asset");
        }

        Ok(EngineBinaries::in_dir(&dir))
    }
}

/// Stable directory name for a remote base URL.
fn cache_key(base_url: &str) -> String {
    let digest = Sha256::digest(base_url.trim_end_matches('/').as_bytes());
    format!("{:x}", digest)[..16].to_string()
}

/// Writes an asset next to its final name, then renames it into place.
async fn install_executable(dir: &Path, name: &str, body: &[u8]) -> io::Result<()> {
    let partial = dir.join(format!("{}.part", name));
    tokio::fs::write(&partial, body).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&partial, std::fs::Permissions::from_mode(0o755)).await?;
    }

    tokio::fs::rename(&partial, dir.join(name)).await
}

/// Runs `<exe> -version` and returns the first line of its output.
async fn self_check(executable: &Path) -> Result<String, SourceFailure> {
    let output = run_version(executable)
        .await
        .map_err(|e| classify_spawn_error(executable, &e))?;

    if !output.status.success() {
        return Err(SourceFailure::Engine(format!(
            "{} -version exited with {}: {}",
            executable.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
}

async fn run_version(executable: &Path) -> io::Result<std::process::Output> {
    let mut retries = 0;
    loop {
        let result = Command::new(executable)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await;

        match result {
            Err(e) if is_text_file_busy(&e) && retries < TEXT_FILE_BUSY_RETRIES => {
                retries += 1;
                tokio::time::sleep(Duration::from_millis(20 * retries as u64)).await;
            }
            other => return other,
        }
    }
}

/// A freshly written executable can still be open for writing in a forked child.
pub(crate) fn is_text_file_busy(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::ExecutableFileBusy
}

/// Maps a failure to start an executable onto the source classification.
fn classify_spawn_error(executable: &Path, e: &io::Error) -> SourceFailure {
    // ENOEXEC: the file is not a valid executable for this host.
    const ENOEXEC: i32 = 8;

    let detail = format!("{}: {}", executable.display(), e);
    match e.kind() {
        io::ErrorKind::NotFound => SourceFailure::Unavailable(detail),
        io::ErrorKind::PermissionDenied => SourceFailure::Environment(detail),
        _ if cfg!(unix) && e.raw_os_error() == Some(ENOEXEC) => SourceFailure::Environment(detail),
        _ => SourceFailure::Io(detail),
    }
}
