//! Core library for the soundcheck application.
//!
//! The crate hosts two independent flows. The capture flow pulls microphone
//! audio through a worker loop, derives a peak amplitude per read, and
//! publishes it into a shared level vector consumed by the bar visualizer.
//! The playback flow drives a streaming engine and translates its lifecycle
//! events into caller-supplied hooks plus an observable session state. The
//! two flows share nothing beyond the error and configuration types.

pub mod analysis;
pub mod capture;
pub mod config;
pub mod error;
pub mod playback;
pub mod visualizer;

pub use analysis::{fan_out, peak_amplitude, AMPLITUDE_SCALE, LEVEL_WEIGHTS};
pub use capture::{mic::MicStream, CaptureStream, CaptureTask};
pub use config::{AppConfig, CaptureConfig, PlaybackConfig, VisualizerConfig};
pub use error::{Result, SoundcheckError};
pub use playback::{
    stream::StreamEngine, transition, PlayHooks, PlaybackController, PlaybackEngine,
    PlaybackPhase, PlayerEvent, PlayerListener, SessionState,
};
pub use visualizer::{
    bar_height, bar_order, layout, Bar, LevelVector, LevelsHandle, BAR_COUNT, HEIGHT_DIVISOR,
};
