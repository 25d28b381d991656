use std::io::IsTerminal;

use bivstream_frame::FrameHeader;
use bivstream_stream::ChannelSummary;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    sequence: u64,
    width: u16,
    height: u16,
    bits: u8,
    fps: &'a str,
    channels: &'a [ChannelSummary],
}

/// One demultiplexed frame: a summary line per channel.
pub fn print_channel_frame(header: &FrameHeader, summaries: &[ChannelSummary], fps: &str, format: OutputFormat) {
    let sequence = summaries.first().map_or(0, |s| s.sequence);
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                sequence,
                width: header.width,
                height: header.height,
                bits: header.sample_bit_width,
                fps,
                channels: summaries,
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "SEQ", "CHANNEL", "SIZE", "MIN", "MAX", "MEAN", "RATE",
                ]);
            for summary in summaries {
                table.add_row(vec![
                    summary.sequence.to_string(),
                    summary.channel.to_string(),
                    format!("{}x{}", summary.width, summary.height),
                    summary.min.to_string(),
                    summary.max.to_string(),
                    format!("{:.1}", summary.mean),
                    fps.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for summary in summaries {
                println!(
                    "frame={} channel={} size={}x{} min={} max={} mean={:.1} {}",
                    summary.sequence,
                    summary.channel,
                    summary.width,
                    summary.height,
                    summary.min,
                    summary.max,
                    summary.mean,
                    fps
                );
            }
        }
    }
}

/// One row of `inspect` output.
#[derive(Debug, Serialize)]
pub struct FrameRecord {
    pub index: usize,
    pub width: u16,
    pub height: u16,
    pub channels: u8,
    pub bits: u8,
    pub payload_bytes: usize,
    /// `None` when the frame would be accepted by the demultiplexer.
    pub problem: Option<String>,
}

#[derive(Serialize)]
struct InspectOutput<'a> {
    frames: &'a [FrameRecord],
    oversized: usize,
    unterminated_bytes: usize,
}

pub fn print_inspect(
    frames: &[FrameRecord],
    oversized: usize,
    unterminated_bytes: usize,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(&InspectOutput {
            frames,
            oversized,
            unterminated_bytes,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "#", "WIDTH", "HEIGHT", "CHANNELS", "BITS", "PAYLOAD", "STATUS",
                ]);
            for frame in frames {
                table.add_row(vec![
                    frame.index.to_string(),
                    frame.width.to_string(),
                    frame.height.to_string(),
                    frame.channels.to_string(),
                    frame.bits.to_string(),
                    frame.payload_bytes.to_string(),
                    frame.problem.clone().unwrap_or_else(|| "ok".to_string()),
                ]);
            }
            println!("{table}");
            println!("oversized: {oversized}  unterminated bytes: {unterminated_bytes}");
        }
        OutputFormat::Pretty => {
            for frame in frames {
                println!(
                    "#{} {}x{} channels={} bits={} payload={} {}",
                    frame.index,
                    frame.width,
                    frame.height,
                    frame.channels,
                    frame.bits,
                    frame.payload_bytes,
                    frame.problem.as_deref().unwrap_or("ok")
                );
            }
            println!("oversized={oversized} unterminated_bytes={unterminated_bytes}");
        }
    }
}

/// Print any serializable value in the requested format.
pub fn print_value<T: Serialize>(value: &T, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(value),
        OutputFormat::Table | OutputFormat::Pretty => {
            let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
            let Some(map) = json.as_object() else {
                println!("{json}");
                return;
            };
            if matches!(format, OutputFormat::Table) {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(vec!["FIELD", "VALUE"]);
                for (key, value) in map {
                    table.add_row(vec![key.clone(), value.to_string()]);
                }
                println!("{table}");
            } else {
                for (key, value) in map {
                    println!("{key}: {value}");
                }
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}
