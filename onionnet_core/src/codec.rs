/*! Length delimited framing of TCP connections using tokio-io

Every message is sent as one frame:

Length   | Content
-------- | ------
`4`      | Length of the body as big endian `u32`
variable | Body
*/

use std::io::Error as IoError;

use bytes::{Buf, BufMut, BytesMut};
use nom::{Err, IResult};
use nom::number::streaming::be_u32;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::stats::Stats;

/// Size of the frame header.
pub const HEADER_SIZE: usize = 4;

/// A frame body should be not longer than 1 MiB.
pub const MAX_FRAME_SIZE: usize = 1 << 20;

/// Error that can happen when decoding a frame from bytes.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Error indicates that the peer announced too big frame.
    #[error("Frame should not be longer than {} bytes: {} bytes", MAX_FRAME_SIZE, len)]
    TooBigFrame {
        /// Announced length of the frame.
        len: usize,
    },
    /// General IO error that can happen with TCP socket.
    #[error("IO Error")]
    Io(IoError),
}

impl DecodeError {
    pub(crate) fn too_big_frame(len: usize) -> DecodeError {
        DecodeError::TooBigFrame { len }
    }
}

/// Error that can happen when encoding a frame to bytes.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Error indicates that the body is too big to be sent.
    #[error("Frame should not be longer than {} bytes: {} bytes", MAX_FRAME_SIZE, len)]
    TooBigFrame {
        /// Length of the body.
        len: usize,
    },
    /// General IO error that can happen with TCP socket.
    #[error("IO Error")]
    Io(IoError),
}

impl From<IoError> for DecodeError {
    fn from(error: IoError) -> DecodeError {
        DecodeError::Io(error)
    }
}

impl From<IoError> for EncodeError {
    fn from(error: IoError) -> EncodeError {
        EncodeError::Io(error)
    }
}

fn frame_len(input: &[u8]) -> IResult<&[u8], u32> {
    be_u32(input)
}

/// Struct to use for {de-,}serializing frames.
#[derive(Clone)]
pub struct FrameCodec {
    stats: Stats,
}

impl FrameCodec {
    /// Make object
    pub fn new(stats: Stats) -> Self {
        FrameCodec {
            stats
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Vec<u8>;
    type Error = DecodeError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let len = match frame_len(&buf[..]) {
            Err(Err::Incomplete(_)) => {
                return Ok(None)
            },
            Err(_) => unreachable!("Frame header cannot be deserialized with error"),
            Ok((_, len)) => len as usize,
        };

        if len > MAX_FRAME_SIZE {
            return Err(DecodeError::too_big_frame(len))
        }

        let required = HEADER_SIZE + len;
        if buf.len() < required {
            buf.reserve(required - buf.len());
            return Ok(None)
        }

        buf.advance(HEADER_SIZE);
        let frame = buf.split_to(len).to_vec();

        self.stats.counters.record_incoming(len);

        Ok(Some(frame))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !buf.is_empty() {
                    debug!("Connection closed in the middle of a frame, dropping {} bytes", buf.len());
                    buf.clear();
                }
                Ok(None)
            },
        }
    }
}

impl Encoder<Vec<u8>> for FrameCodec {
    type Error = EncodeError;

    fn encode(&mut self, frame: Vec<u8>, buf: &mut BytesMut) -> Result<(), Self::Error> {
        let len = frame.len();
        if len > MAX_FRAME_SIZE {
            return Err(EncodeError::TooBigFrame { len })
        }

        buf.reserve(HEADER_SIZE + len);
        buf.put_u32(len as u32);
        buf.extend_from_slice(&frame);

        self.stats.counters.record_outgoing(len);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> FrameCodec {
        FrameCodec::new(Stats::new())
    }

    #[test]
    fn encode_decode() {
        let mut codec = codec();
        let mut buf = BytesMut::new();
        codec.encode(b"hello".to_vec(), &mut buf).expect("should encode");
        assert_eq!(&buf[..HEADER_SIZE], &[0, 0, 0, 5]);
        let frame = codec.decode(&mut buf).unwrap().expect("should decode");
        assert_eq!(frame, b"hello");
        assert!(buf.is_empty());
        assert_eq!(codec.stats.counters.incoming(), 1);
        assert_eq!(codec.stats.counters.outgoing(), 1);
    }

    #[test]
    fn encode_decode_empty_frame() {
        let mut codec = codec();
        let mut buf = BytesMut::new();
        codec.encode(Vec::new(), &mut buf).expect("should encode");
        let frame = codec.decode(&mut buf).unwrap().expect("should decode");
        assert!(frame.is_empty());
    }

    #[test]
    fn decode_two_frames_from_one_buffer() {
        let mut codec = codec();
        let mut buf = BytesMut::new();
        codec.encode(b"one".to_vec(), &mut buf).unwrap();
        codec.encode(b"two".to_vec(), &mut buf).unwrap();
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), b"one");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), b"two");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_incomplete_header() {
        let mut codec = codec();
        let mut buf = BytesMut::from(&[0u8, 0][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn decode_incomplete_body() {
        let mut codec = codec();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 5, b'h', b'e'][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"llo");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), b"hello");
    }

    #[test]
    fn decode_too_big() {
        let mut codec = codec();
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_SIZE as u32 + 1);
        let res = codec.decode(&mut buf);
        assert!(matches!(res, Err(DecodeError::TooBigFrame { len }) if len == MAX_FRAME_SIZE + 1));
    }

    #[test]
    fn decode_eof_truncated() {
        let mut codec = codec();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 5, b'h'][..]);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_too_big() {
        let mut codec = codec();
        let mut buf = BytesMut::new();
        let res = codec.encode(vec![0; MAX_FRAME_SIZE + 1], &mut buf);
        assert!(matches!(res, Err(EncodeError::TooBigFrame { .. })));
        assert!(buf.is_empty());
    }
}
