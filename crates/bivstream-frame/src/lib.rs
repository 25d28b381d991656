//! Marker-delimited frame reassembly for the multi-channel camera link.
//!
//! The board sends an unbounded byte stream. Every frame starts with:
//! - An 8-byte marker (`BIVFRAME`) for stream synchronization
//! - A 6-byte big-endian header (width, height, channel count, sample bits)
//!
//! followed by the raw interleaved samples. A frame's payload ends exactly
//! where the next marker begins, so a frame is only complete once the
//! following marker (and its header) has arrived.

pub mod codec;
pub mod error;
pub mod reassembler;
pub mod reader;
pub mod writer;

pub use codec::{
    encode_frame, Frame, FrameConfig, FrameHeader, DEFAULT_MAX_PAYLOAD, HEADER_LEN, MARKER,
    MARKER_LEN, PREAMBLE_LEN,
};
pub use error::{FrameError, Result};
pub use reassembler::FrameReassembler;
pub use reader::FrameReader;
pub use writer::FrameWriter;
