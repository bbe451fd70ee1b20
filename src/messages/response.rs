// ABOUTME: Inbound schema message carrying one response per callback index
// ABOUTME: Exactly one payload variant may be present; none at all means null

use crate::codec::{
    self, CodecError, Decodable, Encodable, WIRE_LEN, WIRE_VARINT, get_key, get_message,
    get_string, get_uvarint, put_message_field, put_varint_field, skip_field,
};
use bytes::{Buf, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::io::Cursor;
use thiserror::Error;

/// Classification of a per-request failure, mirrored from the wire.
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RequestErrorKind {
    #[default]
    Unspecified = 0,
    /// A transaction was aborted, e.g. by a conflicting `WATCH`.
    ExecAbort = 1,
    /// The native side gave up waiting for the server.
    Timeout = 2,
    /// The server connection dropped while the request was in flight.
    Disconnect = 3,
}

/// A request-level failure; the connection itself stays usable.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct RequestError {
    pub kind: RequestErrorKind,
    pub message: String,
}

impl RequestError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        RequestError {
            kind: RequestErrorKind::Unspecified,
            message: message.into(),
        }
    }
}

/// The single payload a response may carry.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponsePayload {
    /// Handle to a value tree held by the native engine; must be
    /// materialised exactly once.
    RespPointer(u64),
    /// The constant `"OK"` simple string.
    Ok,
    RequestError(RequestError),
    /// Fatal for the whole connection, not just this request.
    ClosingError(String),
}

/// One decoded response frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub callback_idx: u32,
    /// `None` is the wire encoding of a null value.
    pub payload: Option<ResponsePayload>,
}

impl Encodable for RequestError {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        put_varint_field(dst, 1, u64::from(u32::from(self.kind)));
        codec::put_bytes_field(dst, 2, self.message.as_bytes());
        Ok(())
    }
}

impl Decodable for RequestError {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut kind = RequestErrorKind::default();
        let mut message = String::new();
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_VARINT) => {
                    let value = get_uvarint(src)?;
                    kind = RequestErrorKind::try_from(value as u32).map_err(|_| {
                        CodecError::InvalidEnum {
                            field: "error_kind",
                            value,
                        }
                    })?;
                }
                (2, WIRE_LEN) => message = get_string(src, "error_message")?,
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(RequestError { kind, message })
    }
}

impl Encodable for Response {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        // Always emitted so a response frame body is never empty.
        put_varint_field(dst, 1, u64::from(self.callback_idx));
        match &self.payload {
            Some(ResponsePayload::RespPointer(ptr)) => put_varint_field(dst, 2, *ptr),
            Some(ResponsePayload::Ok) => put_varint_field(dst, 3, 0),
            Some(ResponsePayload::RequestError(err)) => put_message_field(dst, 4, err)?,
            Some(ResponsePayload::ClosingError(message)) => {
                codec::put_bytes_field(dst, 5, message.as_bytes());
            }
            None => {}
        }
        Ok(())
    }
}

impl Decodable for Response {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut callback_idx = 0u32;
        let mut payload = None;
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_VARINT) => callback_idx = get_uvarint(src)? as u32,
                (2, WIRE_VARINT) => {
                    payload = Some(ResponsePayload::RespPointer(get_uvarint(src)?));
                }
                (3, WIRE_VARINT) => {
                    let value = get_uvarint(src)?;
                    if value != 0 {
                        return Err(CodecError::InvalidEnum {
                            field: "constant_response",
                            value,
                        });
                    }
                    payload = Some(ResponsePayload::Ok);
                }
                (4, WIRE_LEN) => {
                    payload = Some(ResponsePayload::RequestError(get_message(src)?));
                }
                (5, WIRE_LEN) => {
                    payload = Some(ResponsePayload::ClosingError(get_string(
                        src,
                        "closing_error",
                    )?));
                }
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(Response {
            callback_idx,
            payload,
        })
    }
}
