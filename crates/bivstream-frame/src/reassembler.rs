use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::codec::{Frame, FrameConfig, FrameHeader, MARKER, MARKER_LEN, PREAMBLE_LEN};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 256 * 1024;

/// Turns an unbounded byte stream into a sequence of frames.
///
/// Chunks are pushed as they arrive, with no alignment assumed. Once synced,
/// the accumulator always starts with the marker of the frame being
/// assembled, and `current` holds the header that followed it. A frame is
/// emitted when the next marker and its complete header are present.
///
/// The output depends only on the byte sequence, never on how it was split
/// into chunks.
pub struct FrameReassembler {
    buf: BytesMut,
    current: Option<FrameHeader>,
    /// First index not yet ruled out as a marker start.
    scan_from: usize,
    max_payload_size: usize,
}

impl FrameReassembler {
    /// Create a reassembler with default configuration.
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    /// Create a reassembler with explicit configuration.
    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            current: None,
            scan_from: 0,
            max_payload_size: config.max_payload_size,
        }
    }

    /// Append a chunk read from the link.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Emit the next complete frame, if one is available.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Call repeatedly after
    /// each [`push`](Self::push): a single chunk may close several frames.
    ///
    /// `Err(FrameError::PayloadTooLarge)` reports a discarded frame; the
    /// reassembler has already resynchronized and can be polled again.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let Some(header) = self.current else {
                if !self.sync() {
                    return Ok(None);
                }
                continue;
            };

            match find_marker(&self.buf, self.scan_from) {
                Some(next) if next + PREAMBLE_LEN <= self.buf.len() => {
                    let mut frame = self.buf.split_to(next);
                    frame.advance(PREAMBLE_LEN);
                    self.current = FrameHeader::parse(&self.buf[MARKER_LEN..]);
                    self.scan_from = PREAMBLE_LEN;

                    if frame.len() > self.max_payload_size {
                        return Err(FrameError::PayloadTooLarge {
                            size: frame.len(),
                            max: self.max_payload_size,
                        });
                    }

                    trace!(
                        width = header.width,
                        height = header.height,
                        channels = header.channel_count,
                        bits = header.sample_bit_width,
                        bytes = frame.len(),
                        "frame reassembled"
                    );
                    return Ok(Some(Frame::new(header, frame.freeze())));
                }
                Some(next) => {
                    // Closing marker is here but its header is still in flight.
                    self.scan_from = next;
                    return Ok(None);
                }
                None => {
                    self.scan_from = resume_point(self.buf.len()).max(PREAMBLE_LEN);
                    let certain_payload = self.scan_from - PREAMBLE_LEN;
                    if certain_payload > self.max_payload_size {
                        self.desync();
                        return Err(FrameError::PayloadTooLarge {
                            size: certain_payload,
                            max: self.max_payload_size,
                        });
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Bytes currently buffered and not yet emitted.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// True once a marker and header have been seen.
    pub fn is_synced(&self) -> bool {
        self.current.is_some()
    }

    /// Header of the frame currently being assembled.
    pub fn current_header(&self) -> Option<&FrameHeader> {
        self.current.as_ref()
    }

    /// Search for the first marker, discarding whatever precedes it.
    ///
    /// Returns true once the marker and its full header are buffered.
    fn sync(&mut self) -> bool {
        match find_marker(&self.buf, self.scan_from) {
            Some(start) => {
                if start > 0 {
                    debug!(skipped = start, "discarding bytes before first marker");
                    self.buf.advance(start);
                }
                self.scan_from = 0;
                match FrameHeader::parse(&self.buf[MARKER_LEN..]) {
                    Some(header) => {
                        debug!(
                            width = header.width,
                            height = header.height,
                            channels = header.channel_count,
                            bits = header.sample_bit_width,
                            "stream synchronized"
                        );
                        self.current = Some(header);
                        self.scan_from = PREAMBLE_LEN;
                        true
                    }
                    None => false,
                }
            }
            None => {
                // Keep a possible marker prefix at the tail.
                let discard = resume_point(self.buf.len());
                if discard > 0 {
                    trace!(skipped = discard, "no marker yet, discarding bytes");
                    self.buf.advance(discard);
                }
                self.scan_from = 0;
                false
            }
        }
    }

    /// Drop the oversized frame in progress and hunt for the next marker.
    fn desync(&mut self) {
        let drop_len = resume_point(self.buf.len());
        self.buf.advance(drop_len);
        self.current = None;
        self.scan_from = 0;
        debug!(dropped = drop_len, "oversized frame discarded, resynchronizing");
    }
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameReassembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReassembler")
            .field("buffered", &self.buf.len())
            .field("current", &self.current)
            .field("scan_from", &self.scan_from)
            .finish()
    }
}

/// First index at which a marker could still start once more bytes arrive.
fn resume_point(len: usize) -> usize {
    len.saturating_sub(MARKER_LEN - 1)
}

fn find_marker(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(MARKER_LEN)
        .position(|window| window == MARKER)
        .map(|offset| offset + from)
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::encode_frame;

    fn wire(frames: &[(FrameHeader, Vec<u8>)]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (header, payload) in frames {
            encode_frame(header, payload, &mut buf);
        }
        buf.to_vec()
    }

    fn drain(reassembler: &mut FrameReassembler, out: &mut Vec<Frame>) {
        while let Some(frame) = reassembler.next_frame().unwrap() {
            out.push(frame);
        }
    }

    fn feed_in_chunks(bytes: &[u8], chunk: usize) -> Vec<Frame> {
        let mut reassembler = FrameReassembler::new();
        let mut out = Vec::new();
        for piece in bytes.chunks(chunk) {
            reassembler.push(piece);
            drain(&mut reassembler, &mut out);
        }
        out
    }

    fn sample_stream() -> Vec<u8> {
        let mut frames = Vec::new();
        for i in 0..4u8 {
            let header = FrameHeader::new(4, 2, 2, 8);
            let payload: Vec<u8> = (0..16).map(|b| b + i * 16).collect();
            frames.push((header, payload));
        }
        frames.push((FrameHeader::new(3, 1, 1, 16), vec![0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]));
        // Trailing marker closes the last frame.
        frames.push((FrameHeader::new(1, 1, 1, 8), Vec::new()));
        wire(&frames)
    }

    #[test]
    fn two_frames_from_known_scenario() {
        let payload: Vec<u8> = (1..=16).collect();
        let header = FrameHeader::new(4, 2, 2, 8);
        let bytes = wire(&[(header, payload.clone()), (header, payload.clone())]);

        let mut reassembler = FrameReassembler::new();
        reassembler.push(&bytes);
        let first = reassembler.next_frame().unwrap().unwrap();
        assert_eq!(first.header, header);
        assert_eq!(first.payload.as_ref(), payload.as_slice());

        // The second frame stays open until another marker arrives.
        assert!(reassembler.next_frame().unwrap().is_none());

        let mut closing = BytesMut::new();
        encode_frame(&header, &[], &mut closing);
        reassembler.push(&closing);
        let second = reassembler.next_frame().unwrap().unwrap();
        assert_eq!(second.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn scenario_header_bytes_decode() {
        let mut bytes = MARKER.to_vec();
        bytes.extend_from_slice(&[0x00, 0x04, 0x00, 0x02, 0x02, 0x08]);
        bytes.extend(1..=16u8);
        bytes.extend_from_slice(&MARKER);
        bytes.extend_from_slice(&[0x00, 0x04, 0x00, 0x02, 0x02, 0x08]);

        let frames = feed_in_chunks(&bytes, bytes.len());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header, FrameHeader::new(4, 2, 2, 8));
        assert_eq!(frames[0].payload.as_ref(), (1..=16).collect::<Vec<u8>>());
    }

    #[test]
    fn framing_is_chunk_boundary_invariant() {
        let bytes = sample_stream();
        let whole = feed_in_chunks(&bytes, bytes.len());
        assert_eq!(whole.len(), 5);

        for chunk in [1, 2, 3, 5, 7, 8, 13, 14, 15, 31, 64] {
            assert_eq!(feed_in_chunks(&bytes, chunk), whole, "chunk size {chunk}");
        }
    }

    #[test]
    fn burst_emits_every_complete_frame() {
        let bytes = sample_stream();
        let mut reassembler = FrameReassembler::new();
        reassembler.push(&bytes);

        let mut out = Vec::new();
        drain(&mut reassembler, &mut out);
        assert_eq!(out.len(), 5);
        assert_eq!(reassembler.buffered(), PREAMBLE_LEN);
    }

    #[test]
    fn garbage_before_first_marker_is_discarded() {
        let mut bytes = vec![0xFF, b'B', b'I', 0x00, b'B', b'I', b'V', b'F'];
        bytes.extend(sample_stream());

        let frames = feed_in_chunks(&bytes, 3);
        assert_eq!(frames, feed_in_chunks(&sample_stream(), 1024));
    }

    #[test]
    fn no_marker_keeps_only_possible_prefix() {
        let mut reassembler = FrameReassembler::new();
        reassembler.push(&[0u8; 1000]);
        reassembler.push(b"BIVFRA");
        assert!(reassembler.next_frame().unwrap().is_none());
        assert!(!reassembler.is_synced());
        assert_eq!(reassembler.buffered(), MARKER_LEN - 1);
    }

    #[test]
    fn partial_header_blocks_emission() {
        let header = FrameHeader::new(2, 1, 1, 8);
        let mut bytes = BytesMut::new();
        encode_frame(&header, &[7, 9], &mut bytes);
        bytes.put_slice(&MARKER);
        bytes.put_slice(&[0x00, 0x02, 0x00]);

        let mut reassembler = FrameReassembler::new();
        reassembler.push(&bytes);
        assert!(reassembler.next_frame().unwrap().is_none());

        reassembler.push(&[0x01, 0x01, 0x08]);
        let frame = reassembler.next_frame().unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), &[7, 9]);
        assert_eq!(reassembler.current_header(), Some(&header));
    }

    #[test]
    fn extra_payload_bytes_do_not_move_boundaries() {
        let header = FrameHeader::new(4, 2, 2, 8);
        let base = wire(&[
            (header, vec![0x11; 16]),
            (header, vec![0x22; 16]),
            (header, vec![]),
        ]);
        let padded = wire(&[
            (header, [vec![0x11; 8], vec![0x42, 0x49, 0x56], vec![0x11; 8]].concat()),
            (header, vec![0x22; 16]),
            (header, vec![]),
        ]);

        let base_frames = feed_in_chunks(&base, 5);
        let padded_frames = feed_in_chunks(&padded, 5);
        assert_eq!(base_frames.len(), padded_frames.len());
        assert_eq!(padded_frames[0].payload.len(), 19);
        assert_eq!(padded_frames[1].payload, base_frames[1].payload);
    }

    #[test]
    fn marker_inside_payload_is_treated_as_boundary() {
        let header = FrameHeader::new(1, 1, 1, 8);
        let mut payload = vec![1, 2];
        payload.extend_from_slice(&MARKER);
        payload.extend_from_slice(&[0, 1, 0, 1, 1, 8, 3]);
        let bytes = wire(&[(header, payload), (header, vec![])]);

        let frames = feed_in_chunks(&bytes, bytes.len());
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload.as_ref(), &[1, 2]);
        assert_eq!(frames[1].payload.as_ref(), &[3]);
    }

    #[test]
    fn headers_are_not_validated_here() {
        let odd = FrameHeader::new(0, 3, 0, 12);
        let bytes = wire(&[(odd, vec![1, 2, 3]), (odd, vec![])]);
        let frames = feed_in_chunks(&bytes, 4);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header, odd);
    }

    #[test]
    fn oversized_frame_is_dropped_then_stream_recovers() {
        let cfg = FrameConfig {
            max_payload_size: 32,
            ..FrameConfig::default()
        };
        let header = FrameHeader::new(4, 2, 2, 8);
        let bytes = wire(&[
            (header, vec![0x55; 100]),
            (header, vec![0x66; 16]),
            (header, vec![]),
        ]);

        for chunk in [1, 9, bytes.len()] {
            let mut reassembler = FrameReassembler::with_config(&cfg);
            let mut frames = Vec::new();
            let mut dropped = 0;
            for piece in bytes.chunks(chunk) {
                reassembler.push(piece);
                loop {
                    match reassembler.next_frame() {
                        Ok(Some(frame)) => frames.push(frame),
                        Ok(None) => break,
                        Err(FrameError::PayloadTooLarge { max, .. }) => {
                            assert_eq!(max, 32);
                            dropped += 1;
                        }
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            }
            assert_eq!(dropped, 1, "chunk size {chunk}");
            assert_eq!(frames.len(), 1, "chunk size {chunk}");
            assert_eq!(frames[0].payload.as_ref(), &[0x66; 16]);
        }
    }

    #[test]
    fn empty_payload_frames() {
        let header = FrameHeader::new(1, 1, 1, 8);
        let bytes = wire(&[(header, vec![]), (header, vec![]), (header, vec![])]);
        let frames = feed_in_chunks(&bytes, 2);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.payload.is_empty()));
    }
}
