pub mod audio;
pub mod clipboard;
pub mod config;
pub mod hotkey;
pub mod instance;
pub mod state;
pub mod stats;
pub mod transcribe;
pub mod trim;
pub mod vad;

use thiserror::Error;

/// Top-level error for everything the core can fail at. Component errors
/// convert in via `From` so the binary and the UI collaborator deal with a
/// single type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Audio error: {0}")]
    Audio(#[from] audio::AudioError),
    #[error("API error: {0}")]
    Api(#[from] transcribe::ApiError),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Statistics error: {0}")]
    Stats(#[from] stats::StatsError),
    #[error("Hotkey error: {0}")]
    Hotkey(#[from] hotkey::HotkeyError),
    #[error("Silence trim error: {0}")]
    Trim(#[from] trim::TrimError),
    #[error("Instance error: {0}")]
    Instance(#[from] instance::InstanceError),
}

pub use audio::{CaptureConfig, CaptureEvent, CaptureHandle, RecordingFile, RmsSample};
pub use state::{AppEvent, AppState, StateMachine, UiDelegate};
pub use stats::{AggregatedStats, Period, StatisticsLedger};
pub use transcribe::{Provider, TranscriptionClient, TranscriptionOutcome};
pub use vad::{SilenceConfig, SilenceDetector};
