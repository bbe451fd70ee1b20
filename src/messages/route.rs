// ABOUTME: Routing descriptors attached to cluster-mode requests
// ABOUTME: Encoded as a oneof-style message; the core forwards them opaquely

use crate::codec::{
    self, CodecError, Decodable, Encodable, WIRE_LEN, WIRE_VARINT, get_key, get_message,
    get_string, get_uvarint, put_message_field, put_varint_field, skip_field,
};
use bytes::{Buf, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::io::Cursor;

/// Routes that address a node class rather than a slot.
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimpleRoute {
    AllNodes = 0,
    AllPrimaries = 1,
    Random = 2,
}

/// Which member of a shard a slot route targets.
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SlotType {
    #[default]
    Primary = 0,
    Replica = 1,
}

/// Routing descriptor for a single request.
///
/// The transport core does not know what a slot is; it encodes whichever
/// variant the caller supplies and lets the native engine resolve it.
#[derive(Clone, Debug, PartialEq)]
pub enum Route {
    Simple(SimpleRoute),
    SlotId { slot_id: u32, slot_type: SlotType },
    SlotKey { key: Bytes, slot_type: SlotType },
    ByAddress { host: String, port: u32 },
}

struct SlotIdRoute {
    slot_id: u32,
    slot_type: SlotType,
}

struct SlotKeyRoute {
    key: Bytes,
    slot_type: SlotType,
}

struct ByAddressRoute {
    host: String,
    port: u32,
}

impl Encodable for Route {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        match self {
            Route::Simple(route) => put_varint_field(dst, 1, u64::from(u32::from(*route))),
            Route::SlotId { slot_id, slot_type } => {
                let msg = SlotIdRoute {
                    slot_id: *slot_id,
                    slot_type: *slot_type,
                };
                put_message_field(dst, 2, &msg)?;
            }
            Route::SlotKey { key, slot_type } => {
                let msg = SlotKeyRoute {
                    key: key.clone(),
                    slot_type: *slot_type,
                };
                put_message_field(dst, 3, &msg)?;
            }
            Route::ByAddress { host, port } => {
                let msg = ByAddressRoute {
                    host: host.clone(),
                    port: *port,
                };
                put_message_field(dst, 4, &msg)?;
            }
        }
        Ok(())
    }
}

impl Decodable for Route {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut route = None;
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_VARINT) => {
                    let value = get_uvarint(src)?;
                    let simple = SimpleRoute::try_from(value as u32)
                        .map_err(|_| CodecError::InvalidEnum {
                            field: "simple_route",
                            value,
                        })?;
                    route = Some(Route::Simple(simple));
                }
                (2, WIRE_LEN) => {
                    let msg: SlotIdRoute = get_message(src)?;
                    route = Some(Route::SlotId {
                        slot_id: msg.slot_id,
                        slot_type: msg.slot_type,
                    });
                }
                (3, WIRE_LEN) => {
                    let msg: SlotKeyRoute = get_message(src)?;
                    route = Some(Route::SlotKey {
                        key: msg.key,
                        slot_type: msg.slot_type,
                    });
                }
                (4, WIRE_LEN) => {
                    let msg: ByAddressRoute = get_message(src)?;
                    route = Some(Route::ByAddress {
                        host: msg.host,
                        port: msg.port,
                    });
                }
                _ => skip_field(src, field, wire)?,
            }
        }
        route.ok_or(CodecError::InvalidEnum {
            field: "route",
            value: 0,
        })
    }
}

impl Encodable for SlotIdRoute {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        put_varint_field(dst, 1, u64::from(self.slot_id));
        put_varint_field(dst, 2, u64::from(u32::from(self.slot_type)));
        Ok(())
    }
}

impl Decodable for SlotIdRoute {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut slot_id = 0u32;
        let mut slot_type = SlotType::default();
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_VARINT) => slot_id = get_uvarint(src)? as u32,
                (2, WIRE_VARINT) => slot_type = decode_slot_type(get_uvarint(src)?)?,
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(SlotIdRoute { slot_id, slot_type })
    }
}

impl Encodable for SlotKeyRoute {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        codec::put_bytes_field(dst, 1, &self.key);
        put_varint_field(dst, 2, u64::from(u32::from(self.slot_type)));
        Ok(())
    }
}

impl Decodable for SlotKeyRoute {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut key = Bytes::new();
        let mut slot_type = SlotType::default();
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_LEN) => key = codec::get_bytes(src)?,
                (2, WIRE_VARINT) => slot_type = decode_slot_type(get_uvarint(src)?)?,
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(SlotKeyRoute { key, slot_type })
    }
}

impl Encodable for ByAddressRoute {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        codec::put_bytes_field(dst, 1, self.host.as_bytes());
        put_varint_field(dst, 2, u64::from(self.port));
        Ok(())
    }
}

impl Decodable for ByAddressRoute {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut host = String::new();
        let mut port = 0u32;
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_LEN) => host = get_string(src, "host")?,
                (2, WIRE_VARINT) => port = get_uvarint(src)? as u32,
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(ByAddressRoute { host, port })
    }
}

fn decode_slot_type(value: u64) -> Result<SlotType, CodecError> {
    SlotType::try_from(value as u32).map_err(|_| CodecError::InvalidEnum {
        field: "slot_type",
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(route: Route) {
        let bytes = route.to_bytes().unwrap();
        let mut cursor = Cursor::new(bytes.as_ref());
        assert_eq!(Route::decode(&mut cursor).unwrap(), route);
    }

    #[test]
    fn simple_route_roundtrip() {
        roundtrip(Route::Simple(SimpleRoute::AllPrimaries));
        roundtrip(Route::Simple(SimpleRoute::Random));
    }

    #[test]
    fn slot_routes_roundtrip() {
        roundtrip(Route::SlotId {
            slot_id: 12_182,
            slot_type: SlotType::Replica,
        });
        roundtrip(Route::SlotKey {
            key: Bytes::from_static(b"user:1000"),
            slot_type: SlotType::Primary,
        });
    }

    #[test]
    fn by_address_roundtrip() {
        roundtrip(Route::ByAddress {
            host: "10.0.0.7".to_string(),
            port: 6380,
        });
    }
}
