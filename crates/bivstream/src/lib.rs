//! Camera link framing and stream demultiplexing.
//!
//! An FPGA camera board streams multi-channel frames over a byte link. Each
//! frame starts with the `BIVFRAME` marker and a six-byte header; its payload
//! runs until the next marker.
//!
//! # Crate Structure
//!
//! - [`link`]: duplex byte links over Unix sockets, TCP, or character devices
//! - [`frame`]: marker/header codec and the stream reassembler
//! - [`stream`]: channel demultiplexing, capture recording, and the threaded pipeline

/// Re-export link types.
pub mod link {
    pub use bivstream_link::*;
}

/// Re-export frame types.
pub mod frame {
    pub use bivstream_frame::*;
}

/// Re-export stream types.
pub mod stream {
    pub use bivstream_stream::*;
}
