use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::transcoder::{EngineConfig, EngineSource};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding the single-page frontend.
    #[serde(default = "default_web_dir")]
    pub web_dir: PathBuf,
    /// Largest accepted upload, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            web_dir: default_web_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

fn default_web_dir() -> PathBuf {
    PathBuf::from("web")
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

/// Sanitized config for API responses (credentials in source URLs redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub engine: SanitizedEngineConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedEngineConfig {
    /// Human-readable source labels, in resolution order.
    pub sources: Vec<String>,
    pub preload: bool,
    pub run_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub log_level: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            engine: SanitizedEngineConfig {
                sources: config
                    .engine
                    .sources
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                preload: config.engine.preload,
                run_timeout_secs: config.engine.run_timeout_secs,
                fetch_timeout_secs: config.engine.fetch_timeout_secs,
                log_level: config.engine.log_level.clone(),
            },
        }
    }
}
