use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use bivstream_frame::{Frame, FrameConfig, FrameError, FrameReassembler};
use bivstream_link::{LinkAddr, LinkError};
use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capture::CaptureRequest;
use crate::config::PipelineConfig;
use crate::demux::{ChannelFrame, DemuxStats, PipelineEvent, StreamDemuxer};
use crate::error::{PipelineError, Result};
use crate::queue::bounded_queue;
use crate::recorder::Recorder;
use crate::stats::RateStats;

const LINK_READER: &str = "link-reader";
const REASSEMBLER: &str = "reassembler";
const DEMUXER: &str = "demuxer";

/// Link reader counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub bytes_read: u64,
    pub commands_written: u64,
}

/// Reassembler counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReassemblyReport {
    pub frames: u64,
    /// Frames discarded for exceeding `max_payload_size`.
    pub oversized: u64,
}

/// Totals from every stage after a clean shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub link: LinkReport,
    pub reassembly: ReassemblyReport,
    pub demux: DemuxStats,
}

/// The three-stage link pipeline.
///
/// ```text
/// link ──raw chunks──▶ reassembler ──frames──▶ demuxer ──▶ channel queues
///   ▲                                             ▲
///   └── commands                    capture requests
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Pipeline;

impl Pipeline {
    /// Open `addr`, apply the configured read timeout, and spawn the pipeline.
    pub fn open(addr: &LinkAddr, config: PipelineConfig) -> Result<PipelineHandles> {
        let mut link = bivstream_link::open(addr)?;
        link.set_read_timeout(config.read_timeout())?;
        info!(link = %addr, kind = link.kind(), "link opened");
        Self::spawn(link, config)
    }

    /// Spawn all stages over an already open link.
    ///
    /// Reads that time out are idle ticks; give blocking links a read
    /// timeout so the reader can forward commands and notice a stop request.
    pub fn spawn<L>(link: L, config: PipelineConfig) -> Result<PipelineHandles>
    where
        L: Read + Write + Send + 'static,
    {
        let recorder = Recorder::new(config.capture_format);
        Self::spawn_with_recorder(link, config, recorder)
    }

    /// Spawn with a caller-provided recorder (custom capture sink).
    pub fn spawn_with_recorder<L>(
        link: L,
        config: PipelineConfig,
        recorder: Recorder,
    ) -> Result<PipelineHandles>
    where
        L: Read + Write + Send + 'static,
    {
        config.validate()?;

        let (raw_tx, raw_rx) = channel::bounded::<Bytes>(config.raw_queue_depth);
        let (frame_tx, frame_rx) = channel::bounded::<Frame>(config.frame_queue_depth);
        let (event_tx, events) = channel::bounded(config.event_queue_depth);
        let (captures, capture_rx) = channel::unbounded();
        let (commands, command_rx) = channel::unbounded();

        let (senders, channels): (Vec<_>, Vec<_>) = (0..config.max_channels)
            .map(|_| bounded_queue(config.channel_queue_depth, config.overflow))
            .unzip();
        let demuxer = StreamDemuxer::new(senders, config.crop, recorder)
            .with_capture_requests(capture_rx)
            .with_events(event_tx);

        let stop = Arc::new(AtomicBool::new(false));
        let frame_config = config.frame_config();

        let demuxer = spawn_stage(DEMUXER, move || demuxer.run(&frame_rx))?;
        let reassembler = spawn_stage(REASSEMBLER, move || {
            run_reassembler(&raw_rx, &frame_tx, &frame_config)
        })?;
        let reader_stop = Arc::clone(&stop);
        let reader = spawn_stage(LINK_READER, move || {
            run_link_reader(link, &raw_tx, &command_rx, &reader_stop, &config)
        })?;

        Ok(PipelineHandles {
            channels,
            events,
            captures,
            commands,
            stop,
            reader,
            reassembler,
            demuxer,
        })
    }
}

fn spawn_stage<T, F>(stage: &'static str, f: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(stage.to_string())
        .spawn(f)
        .map_err(|source| PipelineError::Spawn { stage, source })
}

/// Consumer side of a running pipeline.
#[derive(Debug)]
pub struct PipelineHandles {
    /// One queue per channel, index = channel number.
    pub channels: Vec<Receiver<ChannelFrame>>,
    pub events: Receiver<PipelineEvent>,
    /// Capture requests; the last one queued before a frame wins.
    pub captures: Sender<CaptureRequest>,
    /// Raw bytes written to the link verbatim.
    pub commands: Sender<Vec<u8>>,
    stop: Arc<AtomicBool>,
    reader: JoinHandle<Result<LinkReport>>,
    reassembler: JoinHandle<ReassemblyReport>,
    demuxer: JoinHandle<DemuxStats>,
}

impl PipelineHandles {
    /// Shared flag that ends the link reader at its next tick.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// True once the link reader has exited (EOF, stop, or error).
    pub fn is_finished(&self) -> bool {
        self.reader.is_finished()
    }

    /// Wait for every stage. The stages drain in order once the link ends.
    ///
    /// A link failure is returned after the downstream stages have drained.
    pub fn join(self) -> Result<PipelineReport> {
        let link = self
            .reader
            .join()
            .map_err(|_| PipelineError::Panicked(LINK_READER))?;
        let reassembly = self
            .reassembler
            .join()
            .map_err(|_| PipelineError::Panicked(REASSEMBLER))?;
        let demux = self
            .demuxer
            .join()
            .map_err(|_| PipelineError::Panicked(DEMUXER))?;

        Ok(PipelineReport {
            link: link?,
            reassembly,
            demux,
        })
    }
}

fn run_link_reader<L: Read + Write>(
    mut link: L,
    raw_tx: &Sender<Bytes>,
    commands: &Receiver<Vec<u8>>,
    stop: &AtomicBool,
    config: &PipelineConfig,
) -> Result<LinkReport> {
    let mut buf = vec![0u8; config.read_chunk_size];
    let mut rate = RateStats::new(config.rate_window());
    let interval = config.stats_interval();
    let mut next_report = Instant::now() + interval;
    let mut report = LinkReport::default();

    while !stop.load(Ordering::Acquire) {
        if let Ok(command) = commands.try_recv() {
            link.write_all(&command)
                .and_then(|()| link.flush())
                .map_err(|e| {
                    warn!(error = %e, "link write failed");
                    LinkError::Io(e)
                })?;
            report.commands_written += 1;
            debug!(bytes = command.len(), "command written");
        }

        match link.read(&mut buf) {
            Ok(0) => {
                info!(bytes = report.bytes_read, "link closed");
                break;
            }
            Ok(n) => {
                rate.register(n);
                report.bytes_read += n as u64;
                if raw_tx.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                    debug!("reassembler gone");
                    break;
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                warn!(error = %e, "link read failed");
                return Err(LinkError::Io(e).into());
            }
        }

        let now = Instant::now();
        if now >= next_report {
            let sample = rate.result_at(now);
            info!(
                mb_per_sec = sample.megabytes_per_sec(),
                total_mb = sample.total_megabytes(),
                "{:.2} MB/s, {:.2} MB so far",
                sample.megabytes_per_sec(),
                sample.total_megabytes()
            );
            next_report = now + interval;
        }
    }
    Ok(report)
}

fn run_reassembler(
    raw_rx: &Receiver<Bytes>,
    frame_tx: &Sender<Frame>,
    config: &FrameConfig,
) -> ReassemblyReport {
    let mut reassembler = FrameReassembler::with_config(config);
    let mut report = ReassemblyReport::default();

    for chunk in raw_rx.iter() {
        reassembler.push(&chunk);
        loop {
            match reassembler.next_frame() {
                Ok(Some(frame)) => {
                    if frame_tx.send(frame).is_err() {
                        debug!("demultiplexer gone");
                        return report;
                    }
                    report.frames += 1;
                }
                Ok(None) => break,
                Err(FrameError::PayloadTooLarge { size, max }) => {
                    warn!(size, max, "discarding oversized frame");
                    report.oversized += 1;
                }
                Err(err) => {
                    warn!(error = %err, "reassembly error");
                    break;
                }
            }
        }
    }

    if reassembler.buffered() > 0 {
        debug!(bytes = reassembler.buffered(), "unterminated data at end of stream");
    }
    report
}
