use std::path::PathBuf;

use bivstream_link::LinkAddr;
use bivstream_stream::{CaptureFormat, CaptureRequest, CropRect};
use clap::{Args, Subcommand, ValueEnum};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod inspect;
pub mod send;
#[cfg(unix)]
pub mod simulate;
pub mod stream;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the pipeline on a link and print per-channel summaries.
    Stream(StreamArgs),
    /// Serve synthetic frames on a Unix socket.
    #[cfg(unix)]
    Simulate(SimulateArgs),
    /// Write one raw command to a link.
    Send(SendArgs),
    /// Reassemble a raw byte dump and list its frames.
    Inspect(InspectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Stream(args) => stream::run(args, format),
        #[cfg(unix)]
        Command::Simulate(args) => simulate::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OverflowArg {
    DropOldest,
    Block,
}

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Link address: unix:<path>, tcp:<host:port>, or a device path.
    pub link: LinkAddr,
    /// JSON pipeline config file.
    #[arg(long, value_name = "FILE", env = "BIVSTREAM_CONFIG")]
    pub config: Option<PathBuf>,
    /// Fast link timing (top-left crop, 5 ms reads).
    #[arg(long)]
    pub fast: bool,
    /// Number of channel output queues.
    #[arg(long, value_name = "N")]
    pub channels: Option<usize>,
    /// Display crop as X,Y,W,H, or "full".
    #[arg(long, value_name = "X,Y,W,H")]
    pub crop: Option<CropRect>,
    /// What to do when a channel consumer falls behind.
    #[arg(long, value_enum)]
    pub overflow: Option<OverflowArg>,
    /// Wait limit for --overflow block (e.g. 50ms).
    #[arg(long, default_value = "50ms")]
    pub block_timeout: String,
    /// Capture N frames to PATH once streaming starts (N:PATH).
    #[arg(long, value_name = "N:PATH", value_parser = parse_capture)]
    pub capture: Option<CaptureRequest>,
    /// Image format for captured frames.
    #[arg(long, value_name = "FORMAT")]
    pub capture_format: Option<CaptureFormat>,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<u64>,
    /// Read JSON control messages from stdin, one per line.
    #[arg(long)]
    pub stdin_control: bool,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Frames to send (0 = until interrupted).
    #[arg(long, default_value = "10")]
    pub frames: u64,
    #[arg(long, default_value = "640")]
    pub width: u16,
    #[arg(long, default_value = "480")]
    pub height: u16,
    #[arg(long, default_value = "2")]
    pub channels: u8,
    /// Bits per sample: 8, 16, 24, or 32.
    #[arg(long, default_value = "16", value_parser = parse_bits)]
    pub bits: u8,
    /// Delay between frames (e.g. 33ms).
    #[arg(long, default_value = "33ms")]
    pub interval: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Link address: unix:<path>, tcp:<host:port>, or a device path.
    pub link: LinkAddr,
    /// Command bytes as hex (whitespace and 0x prefix allowed).
    #[arg(long)]
    pub hex: String,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Raw link capture to read.
    pub file: PathBuf,
    /// Discard frames with larger payloads.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_capture(input: &str) -> Result<CaptureRequest, String> {
    let (count, path) = input
        .split_once(':')
        .ok_or_else(|| format!("expected N:PATH, got '{input}'"))?;
    let count: u32 = count
        .trim()
        .parse()
        .map_err(|_| format!("invalid frame count '{count}'"))?;
    if count == 0 {
        return Err("frame count must be at least 1".to_string());
    }
    Ok(CaptureRequest::new(count, path))
}

fn parse_bits(input: &str) -> Result<u8, String> {
    match input.trim().parse::<u8>() {
        Ok(bits @ (8 | 16 | 24 | 32)) => Ok(bits),
        _ => Err(format!("bits must be 8, 16, 24, or 32, got '{input}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_arg_parses() {
        assert_eq!(
            parse_capture("3:shots/scene").unwrap(),
            CaptureRequest::new(3, "shots/scene")
        );
        assert_eq!(parse_capture("1:").unwrap(), CaptureRequest::new(1, ""));
        assert!(parse_capture("0:x").is_err());
        assert!(parse_capture("shots").is_err());
    }

    #[test]
    fn bits_arg_parses() {
        assert_eq!(parse_bits("24").unwrap(), 24);
        assert!(parse_bits("12").is_err());
    }
}
