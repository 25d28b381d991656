use std::fmt;
use std::io;
use std::time::Duration;

use bivstream_frame::FrameError;
use bivstream_link::LinkError;
use bivstream_stream::{ConfigError, PipelineError};

pub const SUCCESS: i32 = 0;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::NotFound
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Bind { source, .. }
        | LinkError::Connect { source, .. }
        | LinkError::Accept(source)
        | LinkError::Io(source) => io_error(context, source),
        LinkError::InvalidAddress(_) | LinkError::PathTooLong { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
    }
}

pub fn config_error(context: &str, err: ConfigError) -> CliError {
    match err {
        ConfigError::Read { source, .. } => io_error(context, source),
        ConfigError::Parse { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ConfigError::Invalid(_) => CliError::new(USAGE, format!("{context}: {err}")),
    }
}

pub fn pipeline_error(context: &str, err: PipelineError) -> CliError {
    match err {
        PipelineError::Link(err) => link_error(context, err),
        PipelineError::Config(err) => config_error(context, err),
        PipelineError::Spawn { .. } | PipelineError::Panicked(_) => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
    }
}

/// Parse `250ms`, `5s`, or a bare number of seconds. Zero is allowed.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_parse() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("0ms").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("fast").unwrap_err().code, USAGE);
    }

    #[test]
    fn link_errors_map_to_codes() {
        let refused = LinkError::Connect {
            target: "unix:/tmp/x".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(link_error("connect", refused).code, TRANSPORT_ERROR);

        let bad = LinkError::InvalidAddress("tcp:".to_string());
        assert_eq!(link_error("open", bad).code, USAGE);

        let denied = LinkError::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(link_error("open", denied).code, PERMISSION_DENIED);
    }

    #[test]
    fn pipeline_errors_map_to_codes() {
        let err = PipelineError::Config(ConfigError::Invalid("max_channels".to_string()));
        assert_eq!(pipeline_error("stream", err).code, USAGE);

        let err = PipelineError::Panicked("demuxer");
        let cli = pipeline_error("stream", err);
        assert_eq!(cli.code, INTERNAL);
        assert!(cli.message.contains("demuxer stage panicked"));

        let err = FrameError::PayloadTooLarge { size: 10, max: 1 };
        assert_eq!(frame_error("inspect", err).code, DATA_INVALID);
    }
}
