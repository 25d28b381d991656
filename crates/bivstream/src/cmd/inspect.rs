use std::fs;

use bivstream_frame::{FrameConfig, FrameError, FrameReassembler, DEFAULT_MAX_PAYLOAD};
use bivstream_stream::validate;

use crate::cmd::InspectArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_inspect, FrameRecord, OutputFormat};

/// Everything a dump tells us about its frames.
#[derive(Debug, Default)]
struct Inspection {
    frames: Vec<FrameRecord>,
    oversized: usize,
    /// Trailing bytes of a frame with no closing marker.
    unterminated_bytes: usize,
}

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let data = fs::read(&args.file).map_err(|err| {
        io_error(&format!("failed reading {}", args.file.display()), err)
    })?;

    let config = FrameConfig {
        max_payload_size: args.max_payload.unwrap_or(DEFAULT_MAX_PAYLOAD),
        ..FrameConfig::default()
    };
    let inspection = inspect(&data, &config).map_err(|err| frame_error("inspect failed", err))?;

    print_inspect(
        &inspection.frames,
        inspection.oversized,
        inspection.unterminated_bytes,
        format,
    );
    Ok(SUCCESS)
}

fn inspect(data: &[u8], config: &FrameConfig) -> Result<Inspection, FrameError> {
    let mut reassembler = FrameReassembler::with_config(config);
    reassembler.push(data);

    let mut inspection = Inspection::default();
    loop {
        match reassembler.next_frame() {
            Ok(Some(frame)) => {
                let header = frame.header;
                // Channel limits are a consumer setting; only the frame itself is checked.
                let problem = validate(&header, frame.payload.len(), usize::from(u8::MAX))
                    .err()
                    .map(|err| err.to_string());
                inspection.frames.push(FrameRecord {
                    index: inspection.frames.len(),
                    width: header.width,
                    height: header.height,
                    channels: header.channel_count,
                    bits: header.sample_bit_width,
                    payload_bytes: frame.payload.len(),
                    problem,
                });
            }
            Ok(None) => break,
            Err(FrameError::PayloadTooLarge { .. }) => inspection.oversized += 1,
            Err(err) => return Err(err),
        }
    }
    inspection.unterminated_bytes = reassembler.buffered();
    Ok(inspection)
}
