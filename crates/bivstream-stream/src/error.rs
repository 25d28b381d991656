use std::path::PathBuf;

/// Reasons a reassembled frame is dropped by the demultiplexer.
///
/// These never propagate past the demultiplexer; they are logged and
/// reported as [`PipelineEvent::FrameDropped`](crate::PipelineEvent::FrameDropped).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DemuxError {
    /// A header field is out of range.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// The payload does not match the size the header declares.
    #[error("payload length {actual} does not match header ({expected} bytes expected)")]
    PayloadLength { expected: usize, actual: usize },

    /// The frame carries more channels than there are output queues.
    #[error("frame has {channels} channels, only {max} output queues configured")]
    TooManyChannels { channels: u8, max: usize },
}

/// Errors raised while arming or running a capture.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// A capture must request at least one frame.
    #[error("capture must request at least one frame")]
    InvalidFrameCount,

    /// The output directory could not be created.
    #[error("failed to create capture directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A captured image could not be written.
    #[error("failed to write {path}: {source}")]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Errors loading pipeline configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`PipelineConfig`](crate::PipelineConfig).
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A field value is out of range.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Errors decoding a control message.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The message is not valid JSON or has an unknown type.
    #[error("invalid control message: {0}")]
    Json(#[from] serde_json::Error),

    /// A write command carried malformed hex.
    #[error("invalid command hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// A write command carried no bytes.
    #[error("write command is empty")]
    EmptyCommand,
}

/// Errors that stop a pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Link-level failure; fatal to the reader stage.
    #[error("link error: {0}")]
    Link(#[from] bivstream_link::LinkError),

    /// Configuration was rejected before the stages started.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A stage thread could not be spawned.
    #[error("failed to spawn {stage} stage: {source}")]
    Spawn {
        stage: &'static str,
        source: std::io::Error,
    },

    /// A stage thread panicked.
    #[error("{0} stage panicked")]
    Panicked(&'static str),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
