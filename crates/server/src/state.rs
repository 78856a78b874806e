use std::sync::Arc;
use makeitmp4_core::{Config, ConversionOrchestrator, HostCapabilities, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<ConversionOrchestrator>,
    capabilities: HostCapabilities,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: Arc<ConversionOrchestrator>,
        capabilities: HostCapabilities,
    ) -> Self {
        Self {
            config,
            orchestrator,
            capabilities,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &Arc<ConversionOrchestrator> {
        &self.orchestrator
    }

    pub fn capabilities(&self) -> &HostCapabilities {
        &self.capabilities
    }
}
