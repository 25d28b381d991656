use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bivstream_stream::{
    CaptureRequest, ChannelFrame, ControlAction, ControlMessage, OverflowPolicy, Pipeline,
    PipelineConfig, PipelineEvent,
};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::cmd::{OverflowArg, StreamArgs};
use crate::exit::{
    config_error, parse_duration, pipeline_error, CliError, CliResult, INTERNAL, SUCCESS,
};
use crate::output::{print_channel_frame, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long to wait for the other channels of a frame once channel 0 arrived.
const GATHER_TIMEOUT: Duration = Duration::from_millis(250);

pub fn run(args: StreamArgs, format: OutputFormat) -> CliResult<i32> {
    let config = build_config(&args)?;
    let mut handles =
        Pipeline::open(&args.link, config).map_err(|err| pipeline_error("stream failed", err))?;

    if let Some(request) = args.capture.clone() {
        // The demultiplexer holds the receiver until the link ends.
        let _ = handles.captures.send(request);
    }
    if args.stdin_control {
        spawn_stdin_control(handles.captures.clone(), handles.commands.clone())?;
    }

    let stop = handles.stop_flag();
    install_ctrlc_handler(Arc::clone(&stop))?;

    let channels = std::mem::take(&mut handles.channels);
    let mut fps_text = String::new();
    let mut printed = 0u64;

    while !stop.load(Ordering::SeqCst) {
        drain_events(&handles.events, &mut fps_text);

        let Some(first) = channels.first() else { break };
        let lead = match first.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let present = usize::from(lead.header.channel_count).min(channels.len());
        let mut summaries = vec![lead.summary()];
        summaries.extend(
            channels[1..present]
                .iter()
                .filter_map(|rx| take_matching(rx, lead.sequence))
                .map(|frame| frame.summary()),
        );

        drain_events(&handles.events, &mut fps_text);
        print_channel_frame(&lead.header, &summaries, &fps_text, format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    handles.stop();
    drop(channels);
    let events = handles.events.clone();
    let report = handles
        .join()
        .map_err(|err| pipeline_error("stream failed", err))?;
    drain_events(&events, &mut fps_text);

    info!(
        bytes = report.link.bytes_read,
        frames = report.demux.frames,
        dropped = report.demux.dropped_frames,
        oversized = report.reassembly.oversized,
        commands = report.link.commands_written,
        "stream finished"
    );
    Ok(SUCCESS)
}

/// Config file or preset, then command-line overrides.
fn build_config(args: &StreamArgs) -> CliResult<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .map_err(|err| config_error("failed loading config", err))?,
        None => PipelineConfig::standard(),
    };

    if args.fast {
        let fast = PipelineConfig::fast();
        config.crop = fast.crop;
        config.read_timeout_ms = fast.read_timeout_ms;
    }
    if let Some(channels) = args.channels {
        config.max_channels = channels;
    }
    if let Some(crop) = args.crop {
        config.crop = crop;
    }
    match args.overflow {
        Some(OverflowArg::DropOldest) => config.overflow = OverflowPolicy::DropOldest,
        Some(OverflowArg::Block) => {
            let timeout = parse_duration(&args.block_timeout)?;
            config.overflow = OverflowPolicy::Block {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            };
        }
        None => {}
    }
    if let Some(capture_format) = args.capture_format {
        config.capture_format = capture_format;
    }

    config
        .validate()
        .map_err(|err| config_error("invalid pipeline config", err))?;
    Ok(config)
}

/// Next image for `sequence` on a secondary channel. Stale images are skipped.
fn take_matching(rx: &Receiver<ChannelFrame>, sequence: u64) -> Option<ChannelFrame> {
    let deadline = Instant::now() + GATHER_TIMEOUT;
    loop {
        let frame = rx.recv_deadline(deadline).ok()?;
        match frame.sequence.cmp(&sequence) {
            std::cmp::Ordering::Less => continue,
            std::cmp::Ordering::Equal => return Some(frame),
            std::cmp::Ordering::Greater => {
                debug!(
                    channel = frame.channel,
                    expected = sequence,
                    got = frame.sequence,
                    "channel ahead of lead channel"
                );
                return None;
            }
        }
    }
}

fn drain_events(events: &Receiver<PipelineEvent>, fps_text: &mut String) {
    for event in events.try_iter() {
        match event {
            PipelineEvent::FrameReady { fps_text: text, .. } => *fps_text = text,
            PipelineEvent::FrameDropped { reason } => debug!(%reason, "frame dropped"),
            PipelineEvent::CaptureArmed { frames, dir, base } => {
                info!(frames, dir = %dir.display(), base = %base, "capture armed");
            }
            PipelineEvent::CaptureFailed { reason } => warn!(%reason, "capture failed"),
            PipelineEvent::CaptureFinished { files } => {
                info!(files = files.len(), "capture finished");
            }
        }
    }
}

fn spawn_stdin_control(
    captures: Sender<CaptureRequest>,
    commands: Sender<Vec<u8>>,
) -> CliResult<()> {
    thread::Builder::new()
        .name("stdin-control".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let delivered = match ControlMessage::parse(&line)
                    .and_then(ControlMessage::into_action)
                {
                    Ok(ControlAction::Capture(request)) => captures.send(request).is_ok(),
                    Ok(ControlAction::Write(bytes)) => commands.send(bytes).is_ok(),
                    Err(err) => {
                        warn!(error = %err, "ignoring control message");
                        true
                    }
                };
                if !delivered {
                    break;
                }
            }
            debug!("control input closed");
        })
        .map(drop)
        .map_err(|err| CliError::new(INTERNAL, format!("failed spawning control reader: {err}")))
}

fn install_ctrlc_handler(stop: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
