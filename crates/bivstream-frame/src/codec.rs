use bytes::{BufMut, Bytes, BytesMut};

/// Frame marker: "BIVFRAME". Never appears inside a header or payload.
pub const MARKER: [u8; 8] = *b"BIVFRAME";

/// Marker length in bytes.
pub const MARKER_LEN: usize = MARKER.len();

/// Header: width (2) + height (2) + channel count (1) + sample bits (1) = 6 bytes.
pub const HEADER_LEN: usize = 6;

/// Marker plus header; the payload starts this many bytes after a marker.
pub const PREAMBLE_LEN: usize = MARKER_LEN + HEADER_LEN;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Per-frame metadata carried in-band after every marker.
///
/// Fields are taken from the wire as-is. Nothing is validated here; a
/// header with zero channels or an odd bit width still frames correctly and
/// is rejected further down the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    /// Image width in pixels.
    pub width: u16,
    /// Image height in pixels.
    pub height: u16,
    /// Number of interleaved channels.
    pub channel_count: u8,
    /// Bits per sample (a multiple of 8 on a well-formed link).
    pub sample_bit_width: u8,
}

impl FrameHeader {
    /// Create a header.
    pub fn new(width: u16, height: u16, channel_count: u8, sample_bit_width: u8) -> Self {
        Self {
            width,
            height,
            channel_count,
            sample_bit_width,
        }
    }

    /// Decode the six header bytes that follow a marker.
    ///
    /// Returns `None` if fewer than [`HEADER_LEN`] bytes are available.
    pub fn parse(src: &[u8]) -> Option<Self> {
        let raw = src.get(..HEADER_LEN)?;
        Some(Self {
            width: u16::from_be_bytes([raw[0], raw[1]]),
            height: u16::from_be_bytes([raw[2], raw[3]]),
            channel_count: raw[4],
            sample_bit_width: raw[5],
        })
    }

    /// Encode the header in wire order.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16(self.width);
        dst.put_u16(self.height);
        dst.put_u8(self.channel_count);
        dst.put_u8(self.sample_bit_width);
    }

    /// Bytes per sample (`sample_bit_width / 8`, rounded down).
    pub fn sample_bytes(&self) -> usize {
        usize::from(self.sample_bit_width / 8)
    }

    /// Pixels per channel.
    pub fn pixel_count(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }

    /// Payload size this header declares, or `None` on overflow.
    pub fn expected_payload_len(&self) -> Option<usize> {
        self.pixel_count()
            .checked_mul(usize::from(self.channel_count))?
            .checked_mul(self.sample_bytes())
    }
}

/// One reassembled frame: the header parsed after its opening marker and the
/// raw sample bytes up to the next marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Header that preceded this payload.
    pub header: FrameHeader,
    /// Raw interleaved big-endian samples.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (marker + header + payload).
    pub fn wire_size(&self) -> usize {
        PREAMBLE_LEN + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬─────────┬──────────┬──────────┬──────────┬──────────────────────┐
/// │ Marker     │ Width   │ Height   │ Channels │ Bits     │ Payload              │
/// │ "BIVFRAME" │ (2B BE) │ (2B BE)  │ (1B)     │ (1B)     │ (up to next marker)  │
/// └────────────┴─────────┴──────────┴──────────┴──────────┴──────────────────────┘
/// ```
pub fn encode_frame(header: &FrameHeader, payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(PREAMBLE_LEN + payload.len());
    dst.put_slice(&MARKER);
    header.encode(dst);
    dst.put_slice(payload);
}

/// Configuration for frame reassembly and encoding.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Bytes requested from the link per read.
    pub read_chunk_size: usize,
    /// Write timeout applied to link-backed writers.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_chunk_size: 64 * 1024,
            write_timeout: None,
        }
    }
}
