//! Streaming frame decoder
//!
//! Accumulates raw socket bytes and surfaces complete frames. Partial
//! headers and bodies stay buffered until the remaining bytes arrive, so
//! short reads never produce a truncated frame.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

use super::{decode_header, validate_header, HEAD_LENGTH};

/// Default maximum frame size (10 MB)
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Framing errors. All of these are fatal for the stream they occur on:
/// there is no resynchronization strategy, the connection must be torn
/// down and re-established.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("invalid magic bytes, stream is desynchronized")]
    InvalidMagic,

    #[error("declared frame length {declared} is shorter than the header")]
    InvalidLength { declared: i32 },

    #[error("frame too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

/// A fully decoded inbound frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Message id from the header
    pub id: i32,
    /// Frame body, exactly `total_len - HEAD_LENGTH` bytes
    pub body: Bytes,
}

/// Decodes frames from a byte stream
pub struct FrameDecoder {
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Attempt to decode one frame from the buffer.
    /// Returns `Ok(None)` if more data is needed.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if buf.len() < HEAD_LENGTH {
            return Ok(None);
        }

        if !validate_header(&buf[..HEAD_LENGTH]) {
            return Err(FrameError::InvalidMagic);
        }

        let (id, total_len) = decode_header(&buf[..HEAD_LENGTH]);
        if total_len < HEAD_LENGTH as i32 {
            return Err(FrameError::InvalidLength {
                declared: total_len,
            });
        }

        let total_len = total_len as usize;
        if total_len - HEAD_LENGTH > self.max_frame_size {
            return Err(FrameError::TooLarge {
                size: total_len - HEAD_LENGTH,
                max: self.max_frame_size,
            });
        }

        if buf.len() < total_len {
            buf.reserve(total_len - buf.len());
            return Ok(None);
        }

        let mut frame = buf.split_to(total_len);
        frame.advance(HEAD_LENGTH);

        Ok(Some(Frame {
            id,
            body: frame.freeze(),
        }))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::Packet;
    use super::*;

    #[test]
    fn test_decode_roundtrip() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();

        let packet = Packet::new(42, vec![0x01, 0x02]);
        buf.extend_from_slice(&packet.encode());

        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.id, 42);
        assert_eq!(&frame.body[..], &[0x01, 0x02]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();

        let wire = Packet::new(1, vec![9u8; 4]).encode();
        buf.extend_from_slice(&wire[..10]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&wire[10..]);
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.id, 1);
        assert_eq!(frame.body.len(), 4);
    }

    #[test]
    fn test_decode_incomplete_body() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();

        let wire = Packet::new(3, vec![7u8; 32]).encode();
        buf.extend_from_slice(&wire[..HEAD_LENGTH + 10]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&wire[HEAD_LENGTH + 10..]);
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.body.len(), 32);
    }

    #[test]
    fn test_decode_multiple_frames() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();

        for id in 0..3 {
            buf.extend_from_slice(&Packet::new(id, vec![id as u8]).encode());
        }

        for id in 0..3 {
            let frame = decoder.decode(&mut buf).unwrap().unwrap();
            assert_eq!(frame.id, id);
            assert_eq!(&frame.body[..], &[id as u8]);
        }
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();

        let mut wire = Packet::new(1, vec![]).encode().to_vec();
        wire[0] = 7;
        buf.extend_from_slice(&wire);

        assert!(matches!(
            decoder.decode(&mut buf),
            Err(FrameError::InvalidMagic)
        ));
    }

    #[test]
    fn test_undersized_length_rejected() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();

        // Header declaring a total length shorter than the header itself
        // must never turn into a negative body allocation.
        let mut head = [0u8; HEAD_LENGTH];
        head[0] = 8;
        head[1] = 8;
        head[3..7].copy_from_slice(&10i32.to_le_bytes());
        buf.extend_from_slice(&head);

        assert!(matches!(
            decoder.decode(&mut buf),
            Err(FrameError::InvalidLength { declared: 10 })
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut decoder = FrameDecoder::with_max_frame_size(16);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&Packet::new(1, vec![0u8; 17]).encode());

        assert!(matches!(
            decoder.decode(&mut buf),
            Err(FrameError::TooLarge { size: 17, max: 16 })
        ));
    }
}
