// ABOUTME: Outbound schema messages: single commands, batches, cluster scans and scripts
// ABOUTME: The core encodes these opaquely; argument payloads travel inline or by native pointer

use crate::codec::{
    self, CodecError, Decodable, Encodable, WIRE_LEN, WIRE_VARINT, get_key, get_message,
    get_uvarint, put_message_field, put_varint_field, skip_field,
};
use crate::messages::route::Route;
use crate::messages::request_type::RequestType;
use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;

/// How a request's arguments travel to the native engine.
///
/// Below the large-argument threshold the byte strings are embedded in the
/// encoded message; at or above it the caller interns the vector on the
/// native side and only the returned 64-bit handle goes on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgsBody {
    Inline(Vec<Bytes>),
    Pointer(u64),
}

impl Default for ArgsBody {
    fn default() -> Self {
        ArgsBody::Inline(Vec::new())
    }
}

/// The operation a request carries.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestKind {
    Command {
        request_type: RequestType,
        args: ArgsBody,
    },
    Batch(Batch),
    ClusterScan(ClusterScan),
    Script(ScriptInvocation),
}

/// One framed request as it goes on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandRequest {
    pub callback_idx: u32,
    pub kind: RequestKind,
    pub route: Option<Route>,
}

/// A pipeline or transaction: sub-requests executed as one unit.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Batch {
    pub entries: Vec<BatchEntry>,
    /// When set the batch runs as a MULTI/EXEC transaction.
    pub is_atomic: bool,
    pub raise_on_error: bool,
    pub timeout_ms: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BatchEntry {
    pub request_type: RequestType,
    pub args: ArgsBody,
}

/// Cursor state for an incremental cluster-wide SCAN.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ClusterScan {
    pub cursor_id: Bytes,
    pub match_pattern: Option<Bytes>,
    pub count: Option<u32>,
    pub object_type: Option<Bytes>,
}

/// Invocation of a server-side script by SHA-1 hash.
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptInvocation {
    pub hash: Bytes,
    pub keys: Vec<Bytes>,
    pub args: Vec<Bytes>,
}

// Wrapper so repeated argument bytes nest as their own message on the wire.
struct ArgsArray<'a>(&'a [Bytes]);

impl Encodable for ArgsArray<'_> {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        for arg in self.0 {
            codec::put_bytes_field(dst, 1, arg);
        }
        Ok(())
    }
}

struct ArgsArrayOwned(Vec<Bytes>);

impl Decodable for ArgsArrayOwned {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut args = Vec::new();
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_LEN) => args.push(codec::get_bytes(src)?),
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(ArgsArrayOwned(args))
    }
}

fn put_args(dst: &mut BytesMut, args: &ArgsBody, array_field: u32, pointer_field: u32) -> Result<(), CodecError> {
    match args {
        ArgsBody::Inline(list) if list.is_empty() => {}
        ArgsBody::Inline(list) => put_message_field(dst, array_field, &ArgsArray(list))?,
        ArgsBody::Pointer(ptr) => put_varint_field(dst, pointer_field, *ptr),
    }
    Ok(())
}

fn decode_request_type(value: u64) -> Result<RequestType, CodecError> {
    RequestType::try_from(value as u32).map_err(|_| CodecError::InvalidRequestType(value as u32))
}

impl Encodable for CommandRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        // The callback index is emitted unconditionally so a request frame
        // body is never empty on the wire.
        put_varint_field(dst, 1, u64::from(self.callback_idx));
        match &self.kind {
            RequestKind::Command { request_type, args } => {
                put_varint_field(dst, 2, u64::from(u32::from(*request_type)));
                put_args(dst, args, 3, 4)?;
            }
            RequestKind::Batch(batch) => put_message_field(dst, 6, batch)?,
            RequestKind::ClusterScan(scan) => put_message_field(dst, 7, scan)?,
            RequestKind::Script(script) => put_message_field(dst, 8, script)?,
        }
        if let Some(route) = &self.route {
            put_message_field(dst, 5, route)?;
        }
        Ok(())
    }
}

impl Decodable for CommandRequest {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut callback_idx = 0u32;
        let mut request_type = RequestType::InvalidRequest;
        let mut args = ArgsBody::default();
        let mut route = None;
        let mut batch = None;
        let mut cluster_scan = None;
        let mut script = None;
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_VARINT) => callback_idx = get_uvarint(src)? as u32,
                (2, WIRE_VARINT) => request_type = decode_request_type(get_uvarint(src)?)?,
                (3, WIRE_LEN) => {
                    let array: ArgsArrayOwned = get_message(src)?;
                    args = ArgsBody::Inline(array.0);
                }
                (4, WIRE_VARINT) => args = ArgsBody::Pointer(get_uvarint(src)?),
                (5, WIRE_LEN) => route = Some(get_message::<Route>(src)?),
                (6, WIRE_LEN) => batch = Some(get_message::<Batch>(src)?),
                (7, WIRE_LEN) => cluster_scan = Some(get_message::<ClusterScan>(src)?),
                (8, WIRE_LEN) => script = Some(get_message::<ScriptInvocation>(src)?),
                _ => skip_field(src, field, wire)?,
            }
        }
        let kind = if let Some(batch) = batch {
            RequestKind::Batch(batch)
        } else if let Some(scan) = cluster_scan {
            RequestKind::ClusterScan(scan)
        } else if let Some(script) = script {
            RequestKind::Script(script)
        } else {
            RequestKind::Command { request_type, args }
        };
        Ok(CommandRequest {
            callback_idx,
            kind,
            route,
        })
    }
}

impl Encodable for Batch {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        for entry in &self.entries {
            put_message_field(dst, 1, entry)?;
        }
        if self.is_atomic {
            put_varint_field(dst, 2, 1);
        }
        if self.raise_on_error {
            put_varint_field(dst, 3, 1);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            put_varint_field(dst, 4, u64::from(timeout_ms));
        }
        Ok(())
    }
}

impl Decodable for Batch {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut batch = Batch::default();
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_LEN) => batch.entries.push(get_message(src)?),
                (2, WIRE_VARINT) => batch.is_atomic = get_uvarint(src)? != 0,
                (3, WIRE_VARINT) => batch.raise_on_error = get_uvarint(src)? != 0,
                (4, WIRE_VARINT) => batch.timeout_ms = Some(get_uvarint(src)? as u32),
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(batch)
    }
}

impl Encodable for BatchEntry {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        put_varint_field(dst, 1, u64::from(u32::from(self.request_type)));
        put_args(dst, &self.args, 2, 3)
    }
}

impl Decodable for BatchEntry {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut request_type = RequestType::InvalidRequest;
        let mut args = ArgsBody::default();
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_VARINT) => request_type = decode_request_type(get_uvarint(src)?)?,
                (2, WIRE_LEN) => {
                    let array: ArgsArrayOwned = get_message(src)?;
                    args = ArgsBody::Inline(array.0);
                }
                (3, WIRE_VARINT) => args = ArgsBody::Pointer(get_uvarint(src)?),
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(BatchEntry { request_type, args })
    }
}

impl Encodable for ClusterScan {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        codec::put_bytes_field(dst, 1, &self.cursor_id);
        if let Some(pattern) = &self.match_pattern {
            codec::put_bytes_field(dst, 2, pattern);
        }
        if let Some(count) = self.count {
            put_varint_field(dst, 3, u64::from(count));
        }
        if let Some(object_type) = &self.object_type {
            codec::put_bytes_field(dst, 4, object_type);
        }
        Ok(())
    }
}

impl Decodable for ClusterScan {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut scan = ClusterScan::default();
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_LEN) => scan.cursor_id = codec::get_bytes(src)?,
                (2, WIRE_LEN) => scan.match_pattern = Some(codec::get_bytes(src)?),
                (3, WIRE_VARINT) => scan.count = Some(get_uvarint(src)? as u32),
                (4, WIRE_LEN) => scan.object_type = Some(codec::get_bytes(src)?),
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(scan)
    }
}

impl Encodable for ScriptInvocation {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        codec::put_bytes_field(dst, 1, &self.hash);
        for key in &self.keys {
            codec::put_bytes_field(dst, 2, key);
        }
        for arg in &self.args {
            codec::put_bytes_field(dst, 3, arg);
        }
        Ok(())
    }
}

impl Decodable for ScriptInvocation {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut hash = Bytes::new();
        let mut keys = Vec::new();
        let mut args = Vec::new();
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_LEN) => hash = codec::get_bytes(src)?,
                (2, WIRE_LEN) => keys.push(codec::get_bytes(src)?),
                (3, WIRE_LEN) => args.push(codec::get_bytes(src)?),
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(ScriptInvocation { hash, keys, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::route::SimpleRoute;

    fn roundtrip(request: CommandRequest) {
        let bytes = request.to_bytes().unwrap();
        let mut cursor = Cursor::new(bytes.as_ref());
        assert_eq!(CommandRequest::decode(&mut cursor).unwrap(), request);
    }

    #[test]
    fn command_with_inline_args_roundtrip() {
        roundtrip(CommandRequest {
            callback_idx: 7,
            kind: RequestKind::Command {
                request_type: RequestType::Set,
                args: ArgsBody::Inline(vec![
                    Bytes::from_static(b"key"),
                    Bytes::from_static(b"value"),
                ]),
            },
            route: None,
        });
    }

    #[test]
    fn command_with_pointer_args_roundtrip() {
        roundtrip(CommandRequest {
            callback_idx: 0,
            kind: RequestKind::Command {
                request_type: RequestType::MSet,
                args: ArgsBody::Pointer(0xdead_beef_cafe),
            },
            route: None,
        });
    }

    #[test]
    fn command_without_args_roundtrip() {
        roundtrip(CommandRequest {
            callback_idx: 3,
            kind: RequestKind::Command {
                request_type: RequestType::Ping,
                args: ArgsBody::Inline(Vec::new()),
            },
            route: Some(Route::Simple(SimpleRoute::Random)),
        });
    }

    #[test]
    fn batch_roundtrip() {
        roundtrip(CommandRequest {
            callback_idx: 12,
            kind: RequestKind::Batch(Batch {
                entries: vec![
                    BatchEntry {
                        request_type: RequestType::Get,
                        args: ArgsBody::Inline(vec![Bytes::from_static(b"a")]),
                    },
                    BatchEntry {
                        request_type: RequestType::Incr,
                        args: ArgsBody::Pointer(99),
                    },
                ],
                is_atomic: true,
                raise_on_error: true,
                timeout_ms: Some(250),
            }),
            route: None,
        });
    }

    #[test]
    fn cluster_scan_roundtrip() {
        roundtrip(CommandRequest {
            callback_idx: 1,
            kind: RequestKind::ClusterScan(ClusterScan {
                cursor_id: Bytes::from_static(b"cursor-42"),
                match_pattern: Some(Bytes::from_static(b"user:*")),
                count: Some(100),
                object_type: Some(Bytes::from_static(b"string")),
            }),
            route: None,
        });
    }

    #[test]
    fn script_invocation_roundtrip() {
        roundtrip(CommandRequest {
            callback_idx: 2,
            kind: RequestKind::Script(ScriptInvocation {
                hash: Bytes::from_static(b"a42059b356c875f0717db19a51f6aaca9ae659ea"),
                keys: vec![Bytes::from_static(b"k1"), Bytes::from_static(b"k2")],
                args: vec![Bytes::from_static(b"v")],
            }),
            route: None,
        });
    }

    #[test]
    fn zero_callback_idx_still_produces_bytes() {
        let request = CommandRequest {
            callback_idx: 0,
            kind: RequestKind::Command {
                request_type: RequestType::InvalidRequest,
                args: ArgsBody::Inline(Vec::new()),
            },
            route: None,
        };
        // InvalidRequest encodes as tag zero but the body must stay non-empty.
        assert!(!request.to_bytes().unwrap().is_empty());
    }
}
