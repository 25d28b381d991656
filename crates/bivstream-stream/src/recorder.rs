use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bivstream_frame::FrameHeader;
use image::codecs::png::PngEncoder;
use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{ExtendedColorType, GrayImage, ImageEncoder, ImageError};
use tracing::{debug, info, warn};

use crate::capture::CaptureRequest;
use crate::config::CaptureFormat;
use crate::error::CaptureError;
use crate::raster::ChannelImage;

/// Writes one captured 8-bit channel image.
pub trait CaptureSink: Send {
    /// File extension (without the dot) for names handed to [`CaptureSink::persist`].
    fn extension(&self) -> &'static str;

    fn persist(&mut self, path: &Path, image: &GrayImage) -> Result<(), CaptureError>;
}

/// Encodes captures to image files with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileSink {
    format: CaptureFormat,
}

impl ImageFileSink {
    pub fn new(format: CaptureFormat) -> Self {
        Self { format }
    }
}

impl CaptureSink for ImageFileSink {
    fn extension(&self) -> &'static str {
        self.format.extension()
    }

    fn persist(&mut self, path: &Path, image: &GrayImage) -> Result<(), CaptureError> {
        let encode_err = |source: ImageError| CaptureError::Encode {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(|e| encode_err(ImageError::IoError(e)))?;
        let mut writer = BufWriter::new(file);
        let (width, height) = image.dimensions();

        match self.format {
            CaptureFormat::Png => PngEncoder::new(&mut writer).write_image(
                image.as_raw(),
                width,
                height,
                ExtendedColorType::L8,
            ),
            CaptureFormat::Pgm => PnmEncoder::new(&mut writer)
                .with_subtype(PnmSubtype::Graymap(SampleEncoding::Binary))
                .write_image(image.as_raw(), width, height, ExtendedColorType::L8),
        }
        .map_err(encode_err)?;

        writer
            .flush()
            .map_err(|e| encode_err(ImageError::IoError(e)))?;
        debug!(path = %path.display(), width, height, "wrote capture");
        Ok(())
    }
}

/// What one [`Recorder::commit`] did.
#[derive(Debug, Default)]
pub struct CommitReport {
    /// Files written for this frame.
    pub written: Vec<PathBuf>,
    /// Files that failed to write. The countdown advances regardless.
    pub failures: Vec<CaptureError>,
    /// Set when this commit ended the capture: every file written by it.
    pub finished: Option<Vec<PathBuf>>,
}

#[derive(Debug)]
struct ActiveCapture {
    dir: PathBuf,
    base: String,
    remaining: u32,
    multi_frame: bool,
    sequence_id: u64,
    files: Vec<PathBuf>,
}

/// Counts down a capture request and persists each frame's channels.
///
/// `Idle -> Armed(N) -> ... -> Armed(1) -> Idle`. Arming while armed
/// replaces the active request.
pub struct Recorder {
    sink: Box<dyn CaptureSink>,
    active: Option<ActiveCapture>,
    staged: Vec<VecDeque<ChannelImage>>,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("extension", &self.sink.extension())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl Recorder {
    /// Recorder writing image files in `format`.
    pub fn new(format: CaptureFormat) -> Self {
        Self::with_sink(Box::new(ImageFileSink::new(format)))
    }

    pub fn with_sink(sink: Box<dyn CaptureSink>) -> Self {
        Self {
            sink,
            active: None,
            staged: Vec::new(),
        }
    }

    /// Start (or restart) a capture.
    ///
    /// On error the recorder is left idle.
    pub fn arm(&mut self, request: &CaptureRequest) -> Result<(), CaptureError> {
        if self.active.take().is_some() {
            info!("capture request replaces active capture");
        }
        self.clear_staged();

        if request.frame_count == 0 {
            return Err(CaptureError::InvalidFrameCount);
        }

        let (dir, base) = request.target();
        std::fs::create_dir_all(&dir).map_err(|source| CaptureError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        info!(
            frames = request.frame_count,
            dir = %dir.display(),
            base = %base,
            "capture armed"
        );
        self.active = Some(ActiveCapture {
            dir,
            base,
            remaining: request.frame_count,
            multi_frame: request.multi_frame(),
            sequence_id: 0,
            files: Vec::new(),
        });
        Ok(())
    }

    pub fn is_armed(&self) -> bool {
        self.active.is_some()
    }

    /// Frames still to record, 0 when idle.
    pub fn remaining(&self) -> u32 {
        self.active.as_ref().map_or(0, |a| a.remaining)
    }

    /// Queue a full-resolution channel image for the next commit.
    ///
    /// Ignored while idle. Returns whether the image was staged.
    pub fn stage(&mut self, channel: usize, image: ChannelImage) -> bool {
        if self.active.is_none() {
            return false;
        }
        if self.staged.len() <= channel {
            self.staged.resize_with(channel + 1, VecDeque::new);
        }
        self.staged[channel].push_back(image);
        true
    }

    /// Persist one staged image per channel and advance the countdown.
    ///
    /// Returns `None` while idle.
    pub fn commit(&mut self, header: &FrameHeader) -> Option<CommitReport> {
        let active = self.active.as_mut()?;
        active.remaining -= 1;

        let mut report = CommitReport::default();
        for channel in 0..usize::from(header.channel_count) {
            let Some(image) = self.staged.get_mut(channel).and_then(VecDeque::pop_front) else {
                warn!(channel, "no staged image for capture");
                continue;
            };

            let name = if active.multi_frame {
                format!(
                    "{}_{}_{}_{}_{}_{}.{}",
                    active.base,
                    channel,
                    header.width,
                    header.height,
                    active.remaining,
                    active.sequence_id,
                    self.sink.extension()
                )
            } else {
                format!(
                    "{}_{}_{}_{}_{}.{}",
                    active.base,
                    channel,
                    header.width,
                    header.height,
                    active.sequence_id,
                    self.sink.extension()
                )
            };
            let path = active.dir.join(name);

            let gray = image.to_gray8(header.sample_bit_width);
            match self.sink.persist(&path, &gray) {
                Ok(()) => {
                    active.files.push(path.clone());
                    report.written.push(path);
                }
                Err(err) => {
                    warn!(channel, error = %err, "capture write failed");
                    report.failures.push(err);
                }
            }
        }
        active.sequence_id += 1;

        if active.remaining == 0 {
            let files = std::mem::take(&mut active.files);
            info!(files = files.len(), "capture finished");
            self.active = None;
            self.clear_staged();
            report.finished = Some(files);
        }
        Some(report)
    }

    fn clear_staged(&mut self) {
        for queue in &mut self.staged {
            queue.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Records persisted paths and pixels instead of writing files.
    #[derive(Clone, Default)]
    struct MemorySink {
        written: Arc<Mutex<Vec<(PathBuf, Vec<u8>)>>>,
    }

    impl CaptureSink for MemorySink {
        fn extension(&self) -> &'static str {
            "png"
        }

        fn persist(&mut self, path: &Path, image: &GrayImage) -> Result<(), CaptureError> {
            self.written
                .lock()
                .unwrap()
                .push((path.to_path_buf(), image.as_raw().clone()));
            Ok(())
        }
    }

    struct FailingSink;

    impl CaptureSink for FailingSink {
        fn extension(&self) -> &'static str {
            "png"
        }

        fn persist(&mut self, path: &Path, _image: &GrayImage) -> Result<(), CaptureError> {
            Err(CaptureError::Encode {
                path: path.to_path_buf(),
                source: ImageError::IoError(std::io::Error::other("disk full")),
            })
        }
    }

    fn image(value: u32) -> ChannelImage {
        ChannelImage::new(2, 1, vec![value, value]).unwrap()
    }

    fn record_frame(recorder: &mut Recorder, header: &FrameHeader) -> Option<CommitReport> {
        for channel in 0..usize::from(header.channel_count) {
            recorder.stage(channel, image(0x1200 + channel as u32));
        }
        recorder.commit(header)
    }

    fn file_names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn three_frame_capture_counts_down() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemorySink::default();
        let mut recorder = Recorder::with_sink(Box::new(sink.clone()));
        let header = FrameHeader::new(2, 1, 2, 16);

        let out = format!("{}/scene", dir.path().display());
        recorder.arm(&CaptureRequest::new(3, out)).unwrap();

        let mut last = None;
        for _ in 0..3 {
            last = record_frame(&mut recorder, &header);
        }
        assert!(!recorder.is_armed());
        assert!(record_frame(&mut recorder, &header).is_none());

        let written = sink.written.lock().unwrap();
        let names: Vec<PathBuf> = written.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(
            file_names(&names),
            vec![
                "scene_0_2_1_2_0.png",
                "scene_1_2_1_2_0.png",
                "scene_0_2_1_1_1.png",
                "scene_1_2_1_1_1.png",
                "scene_0_2_1_0_2.png",
                "scene_1_2_1_0_2.png",
            ]
        );
        assert!(names.iter().all(|p| p.parent() == Some(dir.path())));
        assert_eq!(written[1].1, vec![0x12, 0x12]);

        let finished = last.unwrap().finished.unwrap();
        assert_eq!(finished, names);
    }

    #[test]
    fn single_frame_has_no_countdown_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemorySink::default();
        let mut recorder = Recorder::with_sink(Box::new(sink.clone()));
        let header = FrameHeader::new(2, 1, 1, 8);

        recorder
            .arm(&CaptureRequest::new(1, format!("{}/", dir.path().display())))
            .unwrap();
        let report = record_frame(&mut recorder, &header).unwrap();

        assert_eq!(file_names(&report.written), vec!["default_0_2_1_0.png"]);
        assert!(report.finished.is_some());
        assert_eq!(recorder.remaining(), 0);
    }

    #[test]
    fn rearm_restarts_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemorySink::default();
        let mut recorder = Recorder::with_sink(Box::new(sink.clone()));
        let header = FrameHeader::new(2, 1, 1, 8);
        let base = format!("{}/run", dir.path().display());

        recorder.arm(&CaptureRequest::new(5, base.clone())).unwrap();
        record_frame(&mut recorder, &header);
        recorder.stage(0, image(1));

        recorder.arm(&CaptureRequest::new(2, base)).unwrap();
        assert_eq!(recorder.remaining(), 2);
        let report = record_frame(&mut recorder, &header).unwrap();
        assert_eq!(file_names(&report.written), vec!["run_0_2_1_1_0.png"]);
        assert_eq!(report.written.len(), 1);
    }

    #[test]
    fn zero_frames_rejected() {
        let mut recorder = Recorder::with_sink(Box::new(MemorySink::default()));
        let err = recorder.arm(&CaptureRequest::new(0, "")).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidFrameCount));
        assert!(!recorder.is_armed());
    }

    #[test]
    fn create_dir_failure_leaves_idle() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let mut recorder = Recorder::with_sink(Box::new(MemorySink::default()));
        let request = CaptureRequest::new(2, format!("{}/sub/base", blocker.display()));
        let err = recorder.arm(&request).unwrap_err();
        assert!(matches!(err, CaptureError::CreateDir { .. }));
        assert!(!recorder.is_armed());
    }

    #[test]
    fn stage_ignored_while_idle() {
        let mut recorder = Recorder::with_sink(Box::new(MemorySink::default()));
        assert!(!recorder.stage(0, image(3)));
        assert!(recorder.commit(&FrameHeader::new(2, 1, 1, 8)).is_none());
    }

    #[test]
    fn persist_failure_still_counts_down() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::with_sink(Box::new(FailingSink));
        let header = FrameHeader::new(2, 1, 1, 8);

        recorder
            .arm(&CaptureRequest::new(2, format!("{}/x", dir.path().display())))
            .unwrap();
        let report = record_frame(&mut recorder, &header).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.written.is_empty());
        assert_eq!(recorder.remaining(), 1);

        let report = record_frame(&mut recorder, &header).unwrap();
        assert_eq!(report.finished, Some(Vec::new()));
    }

    #[test]
    fn image_file_sink_writes_png_and_pgm() {
        let dir = tempfile::tempdir().unwrap();
        let gray = ChannelImage::new(3, 2, vec![0x0100, 0x0200, 0x0300, 0x0400, 0x0500, 0x0600])
            .unwrap()
            .to_gray8(16);

        let png = dir.path().join("a.png");
        ImageFileSink::new(CaptureFormat::Png)
            .persist(&png, &gray)
            .unwrap();
        let decoded = image::open(&png).unwrap().into_luma8();
        assert_eq!(decoded.as_raw(), &vec![1, 2, 3, 4, 5, 6]);

        let pgm = dir.path().join("a.pgm");
        ImageFileSink::new(CaptureFormat::Pgm)
            .persist(&pgm, &gray)
            .unwrap();
        let bytes = std::fs::read(&pgm).unwrap();
        assert!(bytes.starts_with(b"P5"));
        assert!(bytes.ends_with(&[1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn image_file_sink_reports_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let gray = GrayImage::new(1, 1);
        let err = ImageFileSink::default()
            .persist(&dir.path().join("missing/a.png"), &gray)
            .unwrap_err();
        assert!(matches!(err, CaptureError::Encode { .. }));
    }
}
