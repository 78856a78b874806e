use super::{types::Config, ConfigError};
use crate::transcoder::EngineSource;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Upload limit is not 0
/// - At least one engine source is configured
/// - Remote engine sources use http(s) URLs
/// - Engine timeouts are not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.server.max_upload_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "server.max_upload_bytes cannot be 0".to_string(),
        ));
    }

    if config.engine.sources.is_empty() {
        return Err(ConfigError::ValidationError(
            "engine.sources must list at least one source".to_string(),
        ));
    }

    for source in &config.engine.sources {
        if let EngineSource::Remote { base_url } = source {
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                return Err(ConfigError::ValidationError(format!(
                    "engine source base_url must be http(s): {}",
                    source
                )));
            }
        }
    }

    if config.engine.run_timeout_secs == 0 || config.engine.fetch_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine timeouts cannot be 0".to_string(),
        ));
    }

    Ok(())
}
