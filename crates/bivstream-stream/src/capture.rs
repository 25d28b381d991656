use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Base filename used when a request names none.
pub const DEFAULT_BASE_FILENAME: &str = "default";

/// Ask the demultiplexer to record the next `frame_count` frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub frame_count: u32,
    /// `""`, `"dir"`, `"dir/"`, or `"dir/base"`.
    pub output_path: String,
}

impl CaptureRequest {
    pub fn new(frame_count: u32, output_path: impl Into<String>) -> Self {
        Self {
            frame_count,
            output_path: output_path.into(),
        }
    }

    /// Resolve `(output_dir, base_filename)`.
    ///
    /// The last `/` segment is the base filename. A path without `/` names
    /// a directory, and an empty base falls back to `"default"`.
    pub fn target(&self) -> (PathBuf, String) {
        let path = self.output_path.as_str();
        let (dir, base) = match path.rsplit_once('/') {
            Some((dir, base)) => (dir, base),
            None => (path, ""),
        };

        let dir = if dir.is_empty() {
            PathBuf::from(if path.starts_with('/') { "/" } else { "." })
        } else {
            PathBuf::from(dir)
        };
        let base = if base.is_empty() {
            DEFAULT_BASE_FILENAME.to_string()
        } else {
            base.to_string()
        };
        (dir, base)
    }

    /// Single-frame captures drop the countdown from file names.
    pub fn multi_frame(&self) -> bool {
        self.frame_count > 1
    }
}
