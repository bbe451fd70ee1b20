//! Length-delimited framing on top of the message codec, plus utilities for
//! carving complete frames out of a stream of arbitrarily-sized chunks.

use crate::codec::{self, CodecError, Decodable, Encodable};
use bytes::{Buf, BytesMut};
use std::io::Cursor;
use thiserror::Error;

/// Upper bound on a single frame body, as a guard against a corrupt or
/// hostile length prefix claiming gigabytes.
pub const MAX_FRAME_SIZE: usize = 1 << 30;

#[derive(Debug, Error)]
pub enum FrameError {
    /// Not enough data is available to parse a whole frame, including a
    /// length prefix cut off mid-varint. The unread tail must be kept as
    /// carry-over for the next chunk.
    #[error("stream ended early")]
    Incomplete,

    /// A frame announced a zero-length body. No valid message encodes to
    /// zero bytes, so this always signals a broken peer.
    #[error("zero-length frame")]
    ZeroLength,

    /// The frame length prefix exceeds [`MAX_FRAME_SIZE`].
    #[error("frame of {0} bytes exceeds maximum")]
    Oversized(usize),

    /// The frame was complete but its body failed to decode.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Checks whether an entire frame can be parsed from `src`. On success the
/// total frame length (prefix included) is returned and the cursor is left
/// at the end of the frame.
#[tracing::instrument(skip(src))]
pub fn check(src: &mut Cursor<&[u8]>) -> Result<usize, FrameError> {
    let start = src.position();
    let body_len = read_prefix(src)?;
    if src.remaining() < body_len {
        return Err(FrameError::Incomplete);
    }
    src.advance(body_len);
    Ok((src.position() - start) as usize)
}

/// Parses one frame into a message. The frame should already have been
/// validated with [`check`]; a decode failure on a complete frame is a
/// protocol violation, never a partial read.
#[tracing::instrument(skip(src))]
pub fn parse<M: Decodable>(src: &mut Cursor<&[u8]>) -> Result<M, FrameError> {
    let body_len = read_prefix(src)?;
    if src.remaining() < body_len {
        return Err(FrameError::Incomplete);
    }
    let start = src.position() as usize;
    let msg = {
        let whole: &[u8] = src.get_ref();
        let mut body = Cursor::new(&whole[start..start + body_len]);
        M::decode(&mut body).map_err(|e| FrameError::Malformed(e.to_string()))?
    };
    src.set_position((start + body_len) as u64);
    Ok(msg)
}

/// Appends the length-delimited encoding of `msg` to `dst`.
pub fn encode<M: Encodable>(msg: &M, dst: &mut BytesMut) -> Result<(), CodecError> {
    let mut body = BytesMut::new();
    msg.encode(&mut body)?;
    codec::put_uvarint(dst, body.len() as u64);
    dst.extend_from_slice(&body);
    Ok(())
}

fn read_prefix(src: &mut Cursor<&[u8]>) -> Result<usize, FrameError> {
    let body_len = match codec::get_uvarint(src) {
        Ok(len) => len as usize,
        Err(CodecError::Incomplete) => return Err(FrameError::Incomplete),
        Err(e) => return Err(FrameError::Malformed(e.to_string())),
    };
    if body_len == 0 {
        return Err(FrameError::ZeroLength);
    }
    if body_len > MAX_FRAME_SIZE {
        return Err(FrameError::Oversized(body_len));
    }
    Ok(body_len)
}
