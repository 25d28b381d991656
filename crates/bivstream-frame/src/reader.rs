use std::io::{ErrorKind, Read};

use tracing::warn;

use crate::codec::{Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reassembler::FrameReassembler;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads and marker hunting internally; callers always get
/// complete frames. Oversized frames are skipped with a warning.
pub struct FrameReader<T> {
    inner: T,
    reassembler: FrameReassembler,
    chunk: Vec<u8>,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            reassembler: FrameReassembler::with_config(&config),
            chunk: vec![0u8; config.read_chunk_size.max(1)],
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached. The
    /// last frame of a stream is only returned if a closing marker follows it.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match self.reassembler.next_frame() {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => {}
                Err(FrameError::PayloadTooLarge { size, max }) => {
                    warn!(size, max, "skipping oversized frame");
                    continue;
                }
                Err(err) => return Err(err),
            }

            let read = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.reassembler.push(&self.chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Read> Iterator for FrameReader<T> {
    type Item = Result<Frame>;

    /// Yields frames until the stream closes; EOF ends iteration.
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_frame() {
            Ok(frame) => Some(Ok(frame)),
            Err(FrameError::ConnectionClosed) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{encode_frame, FrameHeader};

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let header = FrameHeader::new(2, 2, 1, 8);
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(&header, payload, &mut buf);
        }
        encode_frame(&header, &[], &mut buf);
        buf.to_vec()
    }

    #[test]
    fn read_consecutive_frames() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"one!", b"two!", b"333!"])));

        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"one!");
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"two!");
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"333!");
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn byte_at_a_time_link() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[b"slow", b"link"]),
            pos: 0,
        };
        let frames: Vec<Frame> = FrameReader::new(byte_reader)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].payload.as_ref(), b"link");
    }

    #[test]
    fn small_chunk_size_matches_large() {
        let bytes = wire(&[&[1; 40], &[2; 12], &[3; 9]]);
        let small = FrameConfig {
            read_chunk_size: 3,
            ..FrameConfig::default()
        };
        let a: Vec<Frame> = FrameReader::with_config(Cursor::new(bytes.clone()), small)
            .collect::<Result<_>>()
            .unwrap();
        let b: Vec<Frame> = FrameReader::new(Cursor::new(bytes))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_link_closes() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn unterminated_frame_is_never_returned() {
        let header = FrameHeader::new(2, 2, 1, 8);
        let mut buf = BytesMut::new();
        encode_frame(&header, b"open", &mut buf);

        let mut reader = FrameReader::new(Cursor::new(buf.to_vec()));
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn oversized_frames_are_skipped() {
        let cfg = FrameConfig {
            max_payload_size: 8,
            ..FrameConfig::default()
        };
        let bytes = wire(&[&[9; 64], b"fits"]);
        let frames: Vec<Frame> = FrameReader::with_config(Cursor::new(bytes), cfg)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.as_ref(), b"fits");
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire(&[b"ok"])),
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(framed.read_frame().unwrap().payload.as_ref(), b"ok");
    }

    #[test]
    fn would_block_propagates_io_error() {
        let mut framed = FrameReader::new(AlwaysWouldBlock);
        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    struct AlwaysWouldBlock;

    impl Read for AlwaysWouldBlock {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }
}
