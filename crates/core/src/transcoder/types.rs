//! Types shared by transcoder implementations.

use serde::{Deserialize, Serialize};

/// Lifecycle of the engine behind a `Transcoder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscoderState {
    Unloaded,
    Loading,
    Loaded,
}

/// Out-of-band report from a running engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Fraction of the input processed so far, 0.0 to 1.0.
    Progress(f32),
    /// A diagnostic line printed by the engine.
    Log(String),
}
