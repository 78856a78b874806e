//! Configuration for the transcoding engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::source::EngineSource;

/// Configuration for the FFmpeg-based transcoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Candidate engine locations, tried in order until one initializes.
    #[serde(default = "default_sources")]
    pub sources: Vec<EngineSource>,

    /// Where assets downloaded from remote sources are stored.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Parent directory of the engine's private scratch filesystem.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Load the engine at startup instead of on the first conversion.
    #[serde(default)]
    pub preload: bool,

    /// Timeout for downloading one remote asset, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Timeout for a single engine run, in seconds.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_sources() -> Vec<EngineSource> {
    vec![
        EngineSource::Path,
        EngineSource::Local {
            dir: PathBuf::from("engine"),
        },
    ]
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("makeitmp4").join("engines")
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("makeitmp4").join("scratch")
}

fn default_fetch_timeout() -> u64 {
    120
}

fn default_run_timeout() -> u64 {
    3600 // 1 hour
}

fn default_log_level() -> String {
    "warning".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            cache_dir: default_cache_dir(),
            scratch_dir: default_scratch_dir(),
            preload: false,
            fetch_timeout_secs: default_fetch_timeout(),
            run_timeout_secs: default_run_timeout(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Creates a config that only tries the given sources.
    pub fn with_sources(sources: Vec<EngineSource>) -> Self {
        Self {
            sources,
            ..Default::default()
        }
    }

    /// Sets the cache and scratch directories under one root.
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.cache_dir = root.join("engines");
        self.scratch_dir = root.join("scratch");
        self
    }

    /// Sets the run timeout in seconds.
    pub fn with_run_timeout(mut self, timeout_secs: u64) -> Self {
        self.run_timeout_secs = timeout_secs;
        self
    }
}
