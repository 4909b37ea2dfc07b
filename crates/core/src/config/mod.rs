use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub visualizer: VisualizerConfig,
    pub playback: PlaybackConfig,
}

impl AppConfig {
    /// Loads a configuration file from disk, falling back to defaults for any
    /// field the file omits.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Configuration for the microphone capture stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Number of 16-bit frames pulled per read.
    pub buffer_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            buffer_size: 2048,
        }
    }
}

/// Geometry of the rendered bar visualizer, in pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub bar_width: f32,
    pub bar_spacing: f32,
    pub max_height: f32,
    pub corner_radius: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            bar_width: 20.0,
            bar_spacing: 10.0,
            max_height: 250.0,
            corner_radius: 32.0,
        }
    }
}

/// Options applied to the HTTP fetch behind the playback engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Sent as an `Authorization: Bearer ...` header when present.
    pub bearer_token: Option<String>,
    pub follow_redirects: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            bearer_token: None,
            follow_redirects: true,
        }
    }
}
