use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use makeitmp4_core::{
    load_config, load_config_from_env, validate_config, Config, ConfigError,
    ConversionOrchestrator, FfmpegTranscoder, HostCapabilities, Transcoder,
};
use makeitmp4_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let json = std::env::var("MAKEITMP4_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Reads the config file, or env and defaults alone when there is none.
fn load(config_path: &Path) -> Result<Config> {
    match load_config(config_path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) => {
            info!(
                "No config file at {:?}, using defaults and environment",
                config_path
            );
            load_config_from_env().context("Failed to load config from environment")
        }
        Err(e) => {
            Err(e).with_context(|| format!("Failed to load config from {:?}", config_path))
        }
    }
}

async fn run() -> Result<()> {
    init_tracing();

    let config_path = std::env::var("MAKEITMP4_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("makeitmp4 {} loading configuration from {:?}", VERSION, config_path);
    let config = load(&config_path)?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    for source in &config.engine.sources {
        info!("Engine source: {}", source);
    }

    // Report the host before the first upload
    let capabilities = HostCapabilities::detect(&config.engine).await;
    if !capabilities.supported {
        warn!(
            os = %capabilities.os,
            arch = %capabilities.arch,
            "Host may not be able to run the conversion engine"
        );
    }
    for warning in &capabilities.warnings {
        warn!("{}", warning);
    }

    let transcoder: Arc<dyn Transcoder> = Arc::new(
        FfmpegTranscoder::from_config(config.engine.clone())
            .context("Failed to create transcoder")?,
    );
    info!("Using transcoder: {}", transcoder.name());

    let orchestrator = Arc::new(ConversionOrchestrator::new(transcoder));

    if config.engine.preload {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            match orchestrator.preload().await {
                Ok(()) => info!("Engine preloaded"),
                Err(e) => warn!(
                    error = %e,
                    "Engine preload failed, will retry on the first conversion"
                ),
            }
        });
    }

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, orchestrator, capabilities));
    let app = create_router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
