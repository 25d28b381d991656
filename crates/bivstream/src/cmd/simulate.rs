use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bivstream_frame::{FrameConfig, FrameError, FrameHeader, FrameWriter};
use bivstream_link::UnixDomainSocket;
use bivstream_stream::validate;
use serde::Serialize;
use tracing::{debug, info};

use crate::cmd::SimulateArgs;
use crate::exit::{
    frame_error, link_error, parse_duration, CliError, CliResult, INTERNAL, SUCCESS, USAGE,
};
use crate::output::{print_value, OutputFormat};

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Serialize)]
struct SimulateSummary {
    frames_sent: u64,
    bytes_sent: u64,
    command_bytes_received: u64,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let header = FrameHeader::new(args.width, args.height, args.channels, args.bits);
    let payload_len = header.expected_payload_len().unwrap_or(usize::MAX);
    validate(&header, payload_len, usize::from(u8::MAX))
        .map_err(|err| CliError::new(USAGE, format!("invalid frame geometry: {err}")))?;

    let listener =
        UnixDomainSocket::bind(&args.path).map_err(|err| link_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst)).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })?;

    info!(path = %args.path.display(), "waiting for consumer");
    let mut link = listener
        .accept()
        .map_err(|err| link_error("accept failed", err))?;
    link.set_read_timeout(Some(Duration::from_millis(1)))
        .map_err(|err| link_error("link setup failed", err))?;
    info!(
        width = header.width,
        height = header.height,
        channels = header.channel_count,
        bits = header.sample_bit_width,
        "consumer connected"
    );

    let config = FrameConfig {
        write_timeout: Some(WRITE_TIMEOUT),
        ..FrameConfig::default()
    };
    let mut writer = FrameWriter::with_config_link(link, config)
        .map_err(|err| frame_error("link setup failed", err))?;
    let mut summary = SimulateSummary::default();
    let mut scratch = [0u8; 4096];

    while running.load(Ordering::SeqCst) && (args.frames == 0 || summary.frames_sent < args.frames)
    {
        let payload = synthetic_payload(&header, summary.frames_sent);
        match writer.send(&header, &payload) {
            Ok(()) => {}
            Err(FrameError::Io(err)) if is_disconnect(err.kind()) => {
                info!("consumer disconnected");
                break;
            }
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(frame_error("send failed", err)),
        }
        summary.frames_sent += 1;
        summary.bytes_sent += payload.len() as u64;

        // Commands written back by the consumer.
        loop {
            match writer.get_mut().read(&mut scratch) {
                Ok(0) => break,
                Ok(n) => {
                    info!(bytes = n, hex = %hex::encode(&scratch[..n]), "command received");
                    summary.command_bytes_received += n as u64;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }

        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }

    // The last frame only completes when another marker follows it.
    if let Err(err) = writer.send(&header, &[]) {
        debug!(error = %err, "closing marker not sent");
    }
    drop(writer);

    print_value(&summary, format);
    Ok(SUCCESS)
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}

/// Diagonal gradient per channel, shifted by one step per frame.
///
/// Samples are interleaved per pixel and big-endian, `sample_bit_width`
/// wide, the way the board sends them.
fn synthetic_payload(header: &FrameHeader, frame: u64) -> Vec<u8> {
    let sample_bytes = header.sample_bytes();
    let mask = if header.sample_bit_width >= 32 {
        u64::from(u32::MAX)
    } else {
        (1u64 << header.sample_bit_width) - 1
    };
    let channels = u64::from(header.channel_count);

    let mut out = Vec::with_capacity(header.expected_payload_len().unwrap_or(0));
    for y in 0..u64::from(header.height) {
        for x in 0..u64::from(header.width) {
            for c in 0..channels {
                let value = ((x + y + frame) * (c + 1)) & mask;
                out.extend_from_slice(&value.to_be_bytes()[8 - sample_bytes..]);
            }
        }
    }
    out
}
