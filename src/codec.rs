// Wire-level codec primitives shared by every schema message.
//
// Messages travel as protobuf-style field streams: each field is a varint key
// (field number shifted left by three, low bits = wire type) followed by a
// varint scalar or a length-delimited payload. Field numbers are part of the
// protocol contract with the native engine and are never renumbered.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;
use thiserror::Error;

/// Varint wire type (scalars, enums, bools, pointers).
pub(crate) const WIRE_VARINT: u8 = 0;
/// Length-delimited wire type (bytes, strings, nested messages).
pub(crate) const WIRE_LEN: u8 = 2;

/// Codec errors with enough context to tell an expected partial read apart
/// from a malformed peer.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Not enough bytes to finish the current field. Expected during normal
    /// operation when a frame arrives in pieces; never an error at the frame
    /// boundary.
    #[error("incomplete message: need more data")]
    Incomplete,

    #[error("varint exceeds 64 bits")]
    VarintOverflow,

    #[error("unsupported wire type {wire} for field {field}")]
    UnexpectedWireType { field: u32, wire: u8 },

    #[error("invalid request type: {0}")]
    InvalidRequestType(u32),

    #[error("invalid enum value {value} in field '{field}'")]
    InvalidEnum { field: &'static str, value: u64 },

    #[error("invalid UTF-8 in field '{field}'")]
    Utf8 {
        field: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Trait for schema messages that can be written to a byte buffer.
pub trait Encodable {
    /// Encode the message body (without any length prefix) into `dst`.
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError>;

    /// Encode into a fresh buffer and return the frozen bytes.
    fn to_bytes(&self) -> Result<Bytes, CodecError> {
        let mut dst = BytesMut::new();
        self.encode(&mut dst)?;
        Ok(dst.freeze())
    }
}

/// Trait for schema messages that can be read back from a byte buffer.
///
/// `decode` consumes the entire remainder of the cursor as one message body;
/// the frame layer is responsible for handing it a correctly-sized slice.
pub trait Decodable: Sized {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError>;
}

/// Write an unsigned LEB128 varint.
pub fn put_uvarint(dst: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        dst.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Read an unsigned LEB128 varint.
///
/// Returns [`CodecError::Incomplete`] when the buffer ends mid-varint, so a
/// length prefix split across chunk boundaries is handled like any other
/// partial read.
pub fn get_uvarint(src: &mut Cursor<&[u8]>) -> Result<u64, CodecError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        if !src.has_remaining() {
            return Err(CodecError::Incomplete);
        }
        let byte = src.get_u8();
        if shift == 63 && byte > 1 {
            return Err(CodecError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 63 {
            return Err(CodecError::VarintOverflow);
        }
    }
}

pub(crate) fn put_key(dst: &mut BytesMut, field: u32, wire: u8) {
    put_uvarint(dst, (u64::from(field) << 3) | u64::from(wire));
}

pub(crate) fn get_key(src: &mut Cursor<&[u8]>) -> Result<(u32, u8), CodecError> {
    let key = get_uvarint(src)?;
    Ok(((key >> 3) as u32, (key & 0x7) as u8))
}

pub(crate) fn put_varint_field(dst: &mut BytesMut, field: u32, value: u64) {
    put_key(dst, field, WIRE_VARINT);
    put_uvarint(dst, value);
}

pub(crate) fn put_bytes_field(dst: &mut BytesMut, field: u32, value: &[u8]) {
    put_key(dst, field, WIRE_LEN);
    put_uvarint(dst, value.len() as u64);
    dst.put_slice(value);
}

pub(crate) fn put_message_field(
    dst: &mut BytesMut,
    field: u32,
    msg: &impl Encodable,
) -> Result<(), CodecError> {
    let mut body = BytesMut::new();
    msg.encode(&mut body)?;
    put_bytes_field(dst, field, &body);
    Ok(())
}

/// Read a length-delimited payload as owned bytes.
pub(crate) fn get_bytes(src: &mut Cursor<&[u8]>) -> Result<Bytes, CodecError> {
    let len = get_uvarint(src)? as usize;
    if src.remaining() < len {
        return Err(CodecError::Incomplete);
    }
    Ok(src.copy_to_bytes(len))
}

/// Read a length-delimited payload as a UTF-8 string.
pub(crate) fn get_string(
    src: &mut Cursor<&[u8]>,
    field: &'static str,
) -> Result<String, CodecError> {
    let bytes = get_bytes(src)?;
    String::from_utf8(bytes.to_vec()).map_err(|e| CodecError::Utf8 { field, source: e })
}

/// Read a length-delimited nested message.
pub(crate) fn get_message<M: Decodable>(src: &mut Cursor<&[u8]>) -> Result<M, CodecError> {
    let len = get_uvarint(src)? as usize;
    if src.remaining() < len {
        return Err(CodecError::Incomplete);
    }
    let start = src.position() as usize;
    let msg = {
        let whole: &[u8] = src.get_ref();
        let mut body = Cursor::new(&whole[start..start + len]);
        M::decode(&mut body)?
    };
    src.set_position((start + len) as u64);
    Ok(msg)
}

/// Skip over a field with an unknown number, preserving forward
/// compatibility with newer schema revisions.
pub(crate) fn skip_field(src: &mut Cursor<&[u8]>, field: u32, wire: u8) -> Result<(), CodecError> {
    match wire {
        WIRE_VARINT => {
            get_uvarint(src)?;
        }
        WIRE_LEN => {
            let len = get_uvarint(src)? as usize;
            if src.remaining() < len {
                return Err(CodecError::Incomplete);
            }
            src.advance(len);
        }
        other => return Err(CodecError::UnexpectedWireType { field, wire: other }),
    }
    tracing::debug!(field, wire, "skipped unknown field");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uvarint_roundtrip() {
        for value in [0u64, 1, 127, 128, 300, 65_535, u64::from(u32::MAX), u64::MAX] {
            let mut buf = BytesMut::new();
            put_uvarint(&mut buf, value);
            let mut cursor = Cursor::new(buf.as_ref());
            assert_eq!(get_uvarint(&mut cursor).unwrap(), value);
            assert_eq!(cursor.position() as usize, buf.len());
        }
    }

    #[test]
    fn uvarint_truncated_is_incomplete() {
        let mut buf = BytesMut::new();
        put_uvarint(&mut buf, 300);
        let mut cursor = Cursor::new(&buf.as_ref()[..1]);
        assert!(matches!(
            get_uvarint(&mut cursor),
            Err(CodecError::Incomplete)
        ));
    }

    #[test]
    fn uvarint_overflow_rejected() {
        // Eleven continuation bytes can never fit in 64 bits.
        let data = [0xffu8; 11];
        let mut cursor = Cursor::new(&data[..]);
        assert!(matches!(
            get_uvarint(&mut cursor),
            Err(CodecError::VarintOverflow)
        ));
    }

    #[test]
    fn key_roundtrip() {
        let mut buf = BytesMut::new();
        put_key(&mut buf, 12, WIRE_LEN);
        let mut cursor = Cursor::new(buf.as_ref());
        assert_eq!(get_key(&mut cursor).unwrap(), (12, WIRE_LEN));
    }

    #[test]
    fn bytes_field_roundtrip() {
        let mut buf = BytesMut::new();
        put_bytes_field(&mut buf, 3, b"hello");
        let mut cursor = Cursor::new(buf.as_ref());
        let (field, wire) = get_key(&mut cursor).unwrap();
        assert_eq!((field, wire), (3, WIRE_LEN));
        assert_eq!(get_bytes(&mut cursor).unwrap().as_ref(), b"hello");
    }

    #[test]
    fn skip_unknown_fields() {
        let mut buf = BytesMut::new();
        put_varint_field(&mut buf, 99, 7);
        put_bytes_field(&mut buf, 100, b"future");
        put_varint_field(&mut buf, 1, 42);

        let mut cursor = Cursor::new(buf.as_ref());
        loop {
            let (field, wire) = get_key(&mut cursor).unwrap();
            if field == 1 {
                assert_eq!(get_uvarint(&mut cursor).unwrap(), 42);
                break;
            }
            skip_field(&mut cursor, field, wire).unwrap();
        }
        assert_eq!(cursor.position() as usize, buf.len());
    }
}
