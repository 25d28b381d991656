//! Stream demultiplexing for the camera link.
//!
//! Frames from `bivstream-frame` are split into per-channel images, cropped,
//! and fanned out to bounded per-channel queues. A recorder persists a
//! requested number of frames on demand, and [`Pipeline`] runs the link
//! reader, reassembler, and demultiplexer as three threads joined by
//! bounded channels.

pub mod capture;
pub mod config;
pub mod control;
pub mod demux;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod raster;
pub mod recorder;
pub mod stats;

pub use capture::{CaptureRequest, DEFAULT_BASE_FILENAME};
pub use config::{CaptureFormat, OverflowPolicy, PipelineConfig, DEFAULT_MAX_CHANNELS};
pub use control::{decode_hex, ControlAction, ControlMessage};
pub use demux::{
    decode_frame, validate, ChannelFrame, ChannelSummary, DemuxStats, PipelineEvent, StreamDemuxer,
};
pub use error::{CaptureError, ConfigError, ControlError, DemuxError, PipelineError, Result};
pub use pipeline::{LinkReport, Pipeline, PipelineHandles, PipelineReport, ReassemblyReport};
pub use queue::{bounded_queue, ChannelSender, PushOutcome};
pub use raster::{combine_samples, deinterleave, ChannelImage, CropRect, SampleStats};
pub use recorder::{CaptureSink, CommitReport, ImageFileSink, Recorder};
pub use stats::{RateSample, RateStats, DEFAULT_RATE_WINDOW};
