pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod testing;
pub mod transcoder;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config,
    ConfigError, SanitizedConfig,
};
pub use orchestrator::{
    ConversionError, ConversionOrchestrator, ConversionResult, ConversionStatus, Notice,
    NoticeKind, Phase, SourceFile,
};
pub use transcoder::{
    EngineConfig, EngineSource, FfmpegTranscoder, HostCapabilities, Transcoder, TranscoderError,
    TranscoderState,
};
