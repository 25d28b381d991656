use std::path::PathBuf;
use std::time::Instant;

use bivstream_frame::{Frame, FrameHeader};
use crossbeam::channel::{Receiver, Sender};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::capture::CaptureRequest;
use crate::error::DemuxError;
use crate::queue::{ChannelSender, PushOutcome};
use crate::raster::{combine_samples, deinterleave, ChannelImage, CropRect};
use crate::recorder::Recorder;

/// One cropped channel of one frame, as handed to display consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFrame {
    /// Header of the originating frame.
    pub header: FrameHeader,
    /// Demultiplexer sequence number of the originating frame.
    pub sequence: u64,
    pub channel: usize,
    pub image: ChannelImage,
}

impl ChannelFrame {
    pub fn summary(&self) -> ChannelSummary {
        let stats = self.image.stats();
        ChannelSummary {
            sequence: self.sequence,
            channel: self.channel,
            width: self.image.width(),
            height: self.image.height(),
            min: stats.map_or(0, |s| s.min),
            max: stats.map_or(0, |s| s.max),
            mean: stats.map_or(0.0, |s| s.mean),
        }
    }
}

/// Printable digest of a [`ChannelFrame`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSummary {
    pub sequence: u64,
    pub channel: usize,
    pub width: usize,
    pub height: usize,
    pub min: u32,
    pub max: u32,
    pub mean: f64,
}

/// Notifications published by the demultiplexer.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A frame was split and queued.
    FrameReady {
        sequence: u64,
        fps: f64,
        fps_text: String,
    },
    /// A frame failed validation and was discarded.
    FrameDropped { reason: DemuxError },
    /// A capture request was accepted.
    CaptureArmed {
        frames: u32,
        dir: PathBuf,
        base: String,
    },
    /// A capture could not start, or a captured file could not be written.
    CaptureFailed { reason: String },
    /// The last requested frame was recorded.
    CaptureFinished { files: Vec<PathBuf> },
}

/// Counters reported when the demultiplexer stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DemuxStats {
    /// Frames split and queued.
    pub frames: u64,
    /// Frames that failed validation.
    pub dropped_frames: u64,
    /// Channel images lost to full queues, per channel.
    pub overflow: Vec<u64>,
}

/// Check a reassembled frame before decoding it.
pub fn validate(header: &FrameHeader, payload_len: usize, max_channels: usize) -> Result<(), DemuxError> {
    if header.width == 0 || header.height == 0 {
        return Err(DemuxError::InvalidHeader("zero width or height"));
    }
    if header.channel_count == 0 {
        return Err(DemuxError::InvalidHeader("zero channels"));
    }
    if !matches!(header.sample_bit_width, 8 | 16 | 24 | 32) {
        return Err(DemuxError::InvalidHeader(
            "sample bit width must be 8, 16, 24, or 32",
        ));
    }

    let expected = header.expected_payload_len().unwrap_or(usize::MAX);
    if payload_len != expected {
        return Err(DemuxError::PayloadLength {
            expected,
            actual: payload_len,
        });
    }
    if usize::from(header.channel_count) > max_channels {
        return Err(DemuxError::TooManyChannels {
            channels: header.channel_count,
            max: max_channels,
        });
    }
    Ok(())
}

/// Validate and split a frame into full-resolution channel images.
pub fn decode_frame(frame: &Frame, max_channels: usize) -> Result<Vec<ChannelImage>, DemuxError> {
    let header = &frame.header;
    validate(header, frame.payload.len(), max_channels)?;

    let samples = combine_samples(&frame.payload, header.sample_bytes());
    deinterleave(
        &samples,
        usize::from(header.channel_count),
        usize::from(header.width),
        usize::from(header.height),
    )
    .ok_or(DemuxError::PayloadLength {
        expected: header.pixel_count() * usize::from(header.channel_count),
        actual: samples.len(),
    })
}

/// Turns frames into per-channel images, drives the recorder, and reports FPS.
///
/// The demultiplexer is the only owner of the recorder; capture requests
/// reach it through a channel polled once per frame.
pub struct StreamDemuxer {
    outputs: Vec<ChannelSender<ChannelFrame>>,
    crop: CropRect,
    recorder: Recorder,
    captures: Option<Receiver<CaptureRequest>>,
    events: Option<Sender<PipelineEvent>>,
    last_frame: Instant,
    stats: DemuxStats,
}

impl StreamDemuxer {
    /// One output queue per channel; frames with more channels are dropped.
    pub fn new(outputs: Vec<ChannelSender<ChannelFrame>>, crop: CropRect, recorder: Recorder) -> Self {
        let stats = DemuxStats {
            overflow: vec![0; outputs.len()],
            ..DemuxStats::default()
        };
        Self {
            outputs,
            crop,
            recorder,
            captures: None,
            events: None,
            last_frame: Instant::now(),
            stats,
        }
    }

    /// Poll this channel for capture requests.
    pub fn with_capture_requests(mut self, captures: Receiver<CaptureRequest>) -> Self {
        self.captures = Some(captures);
        self
    }

    /// Measure the first frame's FPS from `at` instead of construction time.
    pub fn with_clock_start(mut self, at: Instant) -> Self {
        self.last_frame = at;
        self
    }

    /// Publish [`PipelineEvent`]s here. A full event queue drops events.
    pub fn with_events(mut self, events: Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn stats(&self) -> &DemuxStats {
        &self.stats
    }

    /// Handle one frame now.
    pub fn process(&mut self, frame: &Frame) -> Result<u64, DemuxError> {
        self.process_at(frame, Instant::now())
    }

    /// Handle one frame as if it arrived at `now`.
    ///
    /// Returns the frame's sequence number. Invalid frames are counted,
    /// reported as [`PipelineEvent::FrameDropped`], and returned as errors;
    /// they never reach the queues or the recorder.
    pub fn process_at(&mut self, frame: &Frame, now: Instant) -> Result<u64, DemuxError> {
        self.poll_capture_requests();

        let header = frame.header;
        let images = match decode_frame(frame, self.outputs.len()) {
            Ok(images) => images,
            Err(reason) => {
                warn!(
                    width = header.width,
                    height = header.height,
                    channels = header.channel_count,
                    bits = header.sample_bit_width,
                    bytes = frame.payload.len(),
                    %reason,
                    "dropping frame"
                );
                self.stats.dropped_frames += 1;
                self.emit(PipelineEvent::FrameDropped { reason: reason.clone() });
                return Err(reason);
            }
        };

        let sequence = self.stats.frames;
        for (channel, image) in images.into_iter().enumerate() {
            let cropped = image.crop(&self.crop);
            self.recorder.stage(channel, image);

            let outcome = self.outputs[channel].push(ChannelFrame {
                header,
                sequence,
                channel,
                image: cropped,
            });
            if outcome.lost_data() {
                self.stats.overflow[channel] += 1;
                debug!(channel, ?outcome, "channel queue full");
            } else if outcome == PushOutcome::Disconnected {
                trace!(channel, "channel consumer gone");
            }
        }

        if let Some(report) = self.recorder.commit(&header) {
            for err in report.failures {
                self.emit(PipelineEvent::CaptureFailed {
                    reason: err.to_string(),
                });
            }
            if let Some(files) = report.finished {
                self.emit(PipelineEvent::CaptureFinished { files });
            }
        }

        // The first frame is timed from construction.
        let dt = now
            .saturating_duration_since(std::mem::replace(&mut self.last_frame, now))
            .as_secs_f64();
        let fps = if dt > 0.0 { 1.0 / dt } else { 0.0 };
        self.stats.frames += 1;
        self.emit(PipelineEvent::FrameReady {
            sequence,
            fps,
            fps_text: format!("FPS: {fps:.2}"),
        });
        Ok(sequence)
    }

    /// Process frames until the inbound queue disconnects.
    pub fn run(mut self, frames: &Receiver<Frame>) -> DemuxStats {
        for frame in frames.iter() {
            let _ = self.process(&frame);
        }
        debug!(
            frames = self.stats.frames,
            dropped = self.stats.dropped_frames,
            "demultiplexer finished"
        );
        self.stats
    }

    fn poll_capture_requests(&mut self) {
        let Some(captures) = &self.captures else {
            return;
        };
        let Some(request) = captures.try_iter().last() else {
            return;
        };

        match self.recorder.arm(&request) {
            Ok(()) => {
                let (dir, base) = request.target();
                self.emit(PipelineEvent::CaptureArmed {
                    frames: request.frame_count,
                    dir,
                    base,
                });
            }
            Err(err) => {
                warn!(error = %err, path = %request.output_path, "capture request rejected");
                self.emit(PipelineEvent::CaptureFailed {
                    reason: err.to_string(),
                });
            }
        }
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            if events.try_send(event).is_err() {
                trace!("event queue full");
            }
        }
    }
}
