use std::path::Path;
use std::time::Duration;

use bivstream_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::raster::CropRect;

/// Read chunk requested from the link per call: 1 MiB.
pub const DEFAULT_READ_CHUNK: usize = 1024 * 1024;

/// Default number of channel output queues.
pub const DEFAULT_MAX_CHANNELS: usize = 2;

/// What a channel queue does when its consumer falls behind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued image to make room.
    #[default]
    DropOldest,
    /// Wait up to `timeout_ms` for room, then drop the new image.
    Block { timeout_ms: u64 },
}

/// On-disk encoding for captured frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    #[default]
    Png,
    Pgm,
}

impl CaptureFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Pgm => "pgm",
        }
    }
}

impl std::str::FromStr for CaptureFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "pgm" | "pnm" => Ok(Self::Pgm),
            other => Err(ConfigError::Invalid(format!(
                "unknown capture format '{other}' (expected png or pgm)"
            ))),
        }
    }
}

/// Pipeline tuning.
///
/// "Standard" and "fast" link timings differ only in values here: crop
/// rectangle and read timeout. Every field has a default, so a JSON config
/// file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of channel output queues. Frames with more channels are dropped.
    pub max_channels: usize,
    /// Viewport applied to every channel before it is queued.
    pub crop: CropRect,
    /// Depth of each channel output queue.
    pub channel_queue_depth: usize,
    /// Depth of the raw chunk queue between link reader and reassembler.
    pub raw_queue_depth: usize,
    /// Depth of the frame queue between reassembler and demultiplexer.
    pub frame_queue_depth: usize,
    /// Depth of the event queue.
    pub event_queue_depth: usize,
    pub overflow: OverflowPolicy,
    /// Bytes requested per link read.
    pub read_chunk_size: usize,
    /// Link read timeout. Expiry is an idle tick, not an error.
    pub read_timeout_ms: u64,
    /// Interval between throughput log lines.
    pub stats_interval_ms: u64,
    /// Sliding window for the throughput average.
    pub rate_window_ms: u64,
    pub capture_format: CaptureFormat,
    /// Frames with larger payloads are discarded by the reassembler.
    pub max_payload_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl PipelineConfig {
    /// Normal link timing: standard crop, 100 ms reads.
    pub fn standard() -> Self {
        Self {
            max_channels: DEFAULT_MAX_CHANNELS,
            crop: CropRect::STANDARD,
            channel_queue_depth: 4,
            raw_queue_depth: 64,
            frame_queue_depth: 8,
            event_queue_depth: 64,
            overflow: OverflowPolicy::DropOldest,
            read_chunk_size: DEFAULT_READ_CHUNK,
            read_timeout_ms: 100,
            stats_interval_ms: 5_000,
            rate_window_ms: 1_000,
            capture_format: CaptureFormat::Png,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Fast link timing: top-left crop, 5 ms reads.
    pub fn fast() -> Self {
        Self {
            crop: CropRect::FAST,
            read_timeout_ms: 5,
            ..Self::standard()
        }
    }

    /// Load a JSON config file. Missing fields take [`PipelineConfig::standard`] values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_channels", self.max_channels),
            ("channel_queue_depth", self.channel_queue_depth),
            ("raw_queue_depth", self.raw_queue_depth),
            ("frame_queue_depth", self.frame_queue_depth),
            ("event_queue_depth", self.event_queue_depth),
            ("read_chunk_size", self.read_chunk_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
            }
        }
        if self.max_channels > usize::from(u8::MAX) {
            return Err(ConfigError::Invalid(format!(
                "max_channels {} exceeds 255",
                self.max_channels
            )));
        }
        if self.rate_window_ms == 0 {
            return Err(ConfigError::Invalid(
                "rate_window_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    /// Framing settings derived from this config.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            read_chunk_size: self.read_chunk_size,
            ..FrameConfig::default()
        }
    }
}
