//! Host capability detection.
//!
//! Reports whether this host can be expected to run the engine, so the
//! frontend can warn before the first upload.

use serde::Serialize;
use std::path::Path;
use tracing::debug;

use super::config::EngineConfig;

/// Platforms with prebuilt engine binaries.
const SUPPORTED_PLATFORMS: &[(&str, &str)] = &[
    ("linux", "x86_64"),
    ("linux", "aarch64"),
    ("macos", "x86_64"),
    ("macos", "aarch64"),
    ("windows", "x86_64"),
];

/// What the host offers to the engine.
#[derive(Debug, Clone, Serialize)]
pub struct HostCapabilities {
    pub os: String,
    pub arch: String,
    /// Whether every check passed.
    pub supported: bool,
    /// Human-readable reasons the host may not run the engine.
    pub warnings: Vec<String>,
}

impl HostCapabilities {
    /// Checks the current host against the engine configuration.
    pub async fn detect(config: &EngineConfig) -> Self {
        let mut capabilities = Self::evaluate(std::env::consts::OS, std::env::consts::ARCH);

        for (label, dir) in [
            ("cache", config.cache_dir.as_path()),
            ("scratch", config.scratch_dir.as_path()),
        ] {
            if let Err(e) = check_writable(dir).await {
                capabilities
                    .warnings
                    .push(format!("{} directory {} is not writable: {}", label, dir.display(), e));
            }
        }

        capabilities.supported = capabilities.warnings.is_empty();
        debug!(
            os = %capabilities.os,
            arch = %capabilities.arch,
            supported = capabilities.supported,
            "Detected host capabilities"
        );
        capabilities
    }

    /// Platform check only.
    pub fn evaluate(os: &str, arch: &str) -> Self {
        let mut warnings = Vec::new();
        if !SUPPORTED_PLATFORMS.contains(&(os, arch)) {
            warnings.push(format!("no prebuilt engine is known for {}/{}", os, arch));
        }

        Self {
            os: os.to_string(),
            arch: arch.to_string(),
            supported: warnings.is_empty(),
            warnings,
        }
    }
}

async fn check_writable(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let probe = dir.join(format!(".makeitmp4-probe-{}", std::process::id()));
    tokio::fs::write(&probe, b"").await?;
    tokio::fs::remove_file(&probe).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_evaluate_supported_platform() {
        let caps = HostCapabilities::evaluate("linux", "x86_64");
        assert!(caps.supported);
        assert!(caps.warnings.is_empty());
    }

    #[test]
    fn test_evaluate_unsupported_platform() {
        let caps = HostCapabilities::evaluate("freebsd", "riscv64");
        assert!(!caps.supported);
        assert_eq!(caps.warnings.len(), 1);
        assert!(caps.warnings[0].contains("freebsd/riscv64"));
    }

    #[tokio::test]
    async fn test_detect_creates_work_dirs() {
        let work = TempDir::new().unwrap();
        let config = EngineConfig::default().with_work_root(work.path());

        let caps = HostCapabilities::detect(&config).await;
        assert!(config.cache_dir.is_dir());
        assert!(config.scratch_dir.is_dir());
        assert!(!caps
            .warnings
            .iter()
            .any(|w| w.contains("not writable")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_detect_reports_unwritable_dir() {
        let work = TempDir::new().unwrap();
        let blocker = work.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        // A directory cannot be created beneath a regular file.
        let mut config = EngineConfig::default().with_work_root(work.path());
        config.cache_dir = blocker.join("engines");

        let caps = HostCapabilities::detect(&config).await;
        assert!(!caps.supported);
        assert!(caps.warnings.iter().any(|w| w.starts_with("cache directory")));
    }
}
