// ABOUTME: Handshake message carrying the full client configuration to the native engine
// ABOUTME: Sent exactly once per connection, before any command traffic

use crate::codec::{
    self, CodecError, Decodable, Encodable, WIRE_LEN, WIRE_VARINT, get_key, get_message,
    get_string, get_uvarint, put_message_field, put_varint_field, skip_field,
};
use crate::otel::OpenTelemetryConfig;
use bytes::{Buf, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::io::Cursor;

/// Default server port, applied when an address omits one.
pub const DEFAULT_PORT: u16 = 6379;

/// One seed endpoint of the server or cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        NodeAddress {
            host: host.into(),
            port,
        }
    }

    /// Address with the default port.
    pub fn from_host(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_PORT)
    }
}

/// TLS behaviour requested from the native engine.
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TlsMode {
    #[default]
    NoTls = 0,
    Secure = 1,
    /// TLS without certificate verification.
    Insecure = 2,
}

/// Which nodes read commands may be served from.
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReadFrom {
    #[default]
    Primary = 0,
    PreferReplica = 1,
    LowestLatency = 2,
    AzAffinity = 3,
}

/// Exponential backoff parameters for reconnect attempts, applied by the
/// native engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffInfo {
    pub num_retries: u32,
    pub factor: u32,
    pub exponent_base: u32,
    pub jitter_percent: u32,
}

/// Cluster topology check cadence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PeriodicChecks {
    #[default]
    Default,
    Disabled,
    Custom {
        duration_in_sec: u32,
    },
}

/// Username/password pair forwarded in the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthInfo {
    pub username: Option<String>,
    pub password: String,
}

#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PubSubKind {
    #[default]
    Exact = 0,
    Pattern = 1,
    Sharded = 2,
}

/// One channel or pattern subscription applied on connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PubSubSubscription {
    pub kind: PubSubKind,
    pub channel: Bytes,
}

/// The bootstrap handshake message.
///
/// The transport sends this as the first frame on a fresh socket and waits
/// for a single response before any command may be submitted.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ConnectionRequest {
    pub addresses: Vec<NodeAddress>,
    pub tls_mode: TlsMode,
    pub cluster_mode_enabled: bool,
    pub request_timeout_ms: Option<u32>,
    pub connection_timeout_ms: Option<u32>,
    pub read_from: ReadFrom,
    pub connection_backoff: Option<BackoffInfo>,
    pub database_id: u32,
    pub credentials: Option<AuthInfo>,
    pub periodic_checks: PeriodicChecks,
    pub pubsub_subscriptions: Vec<PubSubSubscription>,
    pub otel: Option<OpenTelemetryConfig>,
}

impl Encodable for NodeAddress {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        codec::put_bytes_field(dst, 1, self.host.as_bytes());
        put_varint_field(dst, 2, u64::from(self.port));
        Ok(())
    }
}

impl Decodable for NodeAddress {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut host = String::new();
        let mut port = DEFAULT_PORT;
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_LEN) => host = get_string(src, "host")?,
                (2, WIRE_VARINT) => port = get_uvarint(src)? as u16,
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(NodeAddress { host, port })
    }
}

impl Encodable for BackoffInfo {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        put_varint_field(dst, 1, u64::from(self.num_retries));
        put_varint_field(dst, 2, u64::from(self.factor));
        put_varint_field(dst, 3, u64::from(self.exponent_base));
        put_varint_field(dst, 4, u64::from(self.jitter_percent));
        Ok(())
    }
}

impl Decodable for BackoffInfo {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut info = BackoffInfo {
            num_retries: 0,
            factor: 0,
            exponent_base: 0,
            jitter_percent: 0,
        };
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_VARINT) => info.num_retries = get_uvarint(src)? as u32,
                (2, WIRE_VARINT) => info.factor = get_uvarint(src)? as u32,
                (3, WIRE_VARINT) => info.exponent_base = get_uvarint(src)? as u32,
                (4, WIRE_VARINT) => info.jitter_percent = get_uvarint(src)? as u32,
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(info)
    }
}

impl Encodable for PeriodicChecks {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        match self {
            PeriodicChecks::Default => put_varint_field(dst, 1, 0),
            PeriodicChecks::Disabled => put_varint_field(dst, 1, 1),
            PeriodicChecks::Custom { duration_in_sec } => {
                put_varint_field(dst, 1, 2);
                put_varint_field(dst, 2, u64::from(*duration_in_sec));
            }
        }
        Ok(())
    }
}

impl Decodable for PeriodicChecks {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut mode = 0u64;
        let mut duration_in_sec = 0u32;
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_VARINT) => mode = get_uvarint(src)?,
                (2, WIRE_VARINT) => duration_in_sec = get_uvarint(src)? as u32,
                _ => skip_field(src, field, wire)?,
            }
        }
        match mode {
            0 => Ok(PeriodicChecks::Default),
            1 => Ok(PeriodicChecks::Disabled),
            2 => Ok(PeriodicChecks::Custom { duration_in_sec }),
            value => Err(CodecError::InvalidEnum {
                field: "periodic_checks",
                value,
            }),
        }
    }
}

impl Encodable for AuthInfo {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        if let Some(username) = &self.username {
            codec::put_bytes_field(dst, 1, username.as_bytes());
        }
        codec::put_bytes_field(dst, 2, self.password.as_bytes());
        Ok(())
    }
}

impl Decodable for AuthInfo {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut username = None;
        let mut password = String::new();
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_LEN) => username = Some(get_string(src, "username")?),
                (2, WIRE_LEN) => password = get_string(src, "password")?,
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(AuthInfo { username, password })
    }
}

impl Encodable for PubSubSubscription {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        put_varint_field(dst, 1, u64::from(u32::from(self.kind)));
        codec::put_bytes_field(dst, 2, &self.channel);
        Ok(())
    }
}

impl Decodable for PubSubSubscription {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut kind = PubSubKind::default();
        let mut channel = Bytes::new();
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_VARINT) => {
                    let value = get_uvarint(src)?;
                    kind = PubSubKind::try_from(value as u32).map_err(|_| {
                        CodecError::InvalidEnum {
                            field: "pubsub_kind",
                            value,
                        }
                    })?;
                }
                (2, WIRE_LEN) => channel = codec::get_bytes(src)?,
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(PubSubSubscription { kind, channel })
    }
}

impl Encodable for OpenTelemetryConfig {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        if let Some(endpoint) = &self.traces_endpoint {
            codec::put_bytes_field(dst, 1, endpoint.as_bytes());
        }
        if let Some(endpoint) = &self.metrics_endpoint {
            codec::put_bytes_field(dst, 2, endpoint.as_bytes());
        }
        put_varint_field(dst, 3, u64::from(self.sample_percentage));
        put_varint_field(dst, 4, self.flush_interval_ms);
        Ok(())
    }
}

impl Decodable for OpenTelemetryConfig {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut config = OpenTelemetryConfig {
            traces_endpoint: None,
            metrics_endpoint: None,
            sample_percentage: 0,
            flush_interval_ms: 0,
        };
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_LEN) => config.traces_endpoint = Some(get_string(src, "traces_endpoint")?),
                (2, WIRE_LEN) => {
                    config.metrics_endpoint = Some(get_string(src, "metrics_endpoint")?);
                }
                (3, WIRE_VARINT) => config.sample_percentage = get_uvarint(src)? as u32,
                (4, WIRE_VARINT) => config.flush_interval_ms = get_uvarint(src)?,
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(config)
    }
}

impl Encodable for ConnectionRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        for address in &self.addresses {
            put_message_field(dst, 1, address)?;
        }
        put_varint_field(dst, 2, u64::from(u32::from(self.tls_mode)));
        if self.cluster_mode_enabled {
            put_varint_field(dst, 3, 1);
        }
        if let Some(timeout) = self.request_timeout_ms {
            put_varint_field(dst, 4, u64::from(timeout));
        }
        if let Some(timeout) = self.connection_timeout_ms {
            put_varint_field(dst, 5, u64::from(timeout));
        }
        put_varint_field(dst, 6, u64::from(u32::from(self.read_from)));
        if let Some(backoff) = &self.connection_backoff {
            put_message_field(dst, 7, backoff)?;
        }
        put_varint_field(dst, 8, u64::from(self.database_id));
        if let Some(credentials) = &self.credentials {
            put_message_field(dst, 10, credentials)?;
        }
        put_message_field(dst, 11, &self.periodic_checks)?;
        for subscription in &self.pubsub_subscriptions {
            put_message_field(dst, 12, subscription)?;
        }
        if let Some(otel) = &self.otel {
            put_message_field(dst, 13, otel)?;
        }
        Ok(())
    }
}

impl Decodable for ConnectionRequest {
    fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut request = ConnectionRequest::default();
        while src.has_remaining() {
            let (field, wire) = get_key(src)?;
            match (field, wire) {
                (1, WIRE_LEN) => request.addresses.push(get_message(src)?),
                (2, WIRE_VARINT) => {
                    let value = get_uvarint(src)?;
                    request.tls_mode = TlsMode::try_from(value as u32).map_err(|_| {
                        CodecError::InvalidEnum {
                            field: "tls_mode",
                            value,
                        }
                    })?;
                }
                (3, WIRE_VARINT) => request.cluster_mode_enabled = get_uvarint(src)? != 0,
                (4, WIRE_VARINT) => request.request_timeout_ms = Some(get_uvarint(src)? as u32),
                (5, WIRE_VARINT) => request.connection_timeout_ms = Some(get_uvarint(src)? as u32),
                (6, WIRE_VARINT) => {
                    let value = get_uvarint(src)?;
                    request.read_from = ReadFrom::try_from(value as u32).map_err(|_| {
                        CodecError::InvalidEnum {
                            field: "read_from",
                            value,
                        }
                    })?;
                }
                (7, WIRE_LEN) => request.connection_backoff = Some(get_message(src)?),
                (8, WIRE_VARINT) => request.database_id = get_uvarint(src)? as u32,
                (10, WIRE_LEN) => request.credentials = Some(get_message(src)?),
                (11, WIRE_LEN) => request.periodic_checks = get_message(src)?,
                (12, WIRE_LEN) => request.pubsub_subscriptions.push(get_message(src)?),
                (13, WIRE_LEN) => request.otel = Some(get_message(src)?),
                _ => skip_field(src, field, wire)?,
            }
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_request_roundtrip() {
        let request = ConnectionRequest {
            addresses: vec![NodeAddress::from_host("localhost")],
            ..ConnectionRequest::default()
        };
        let bytes = request.to_bytes().unwrap();
        let mut cursor = Cursor::new(bytes.as_ref());
        assert_eq!(ConnectionRequest::decode(&mut cursor).unwrap(), request);
    }

    #[test]
    fn full_request_roundtrip() {
        let request = ConnectionRequest {
            addresses: vec![
                NodeAddress::new("10.0.0.1", 6379),
                NodeAddress::new("10.0.0.2", 6380),
            ],
            tls_mode: TlsMode::Insecure,
            cluster_mode_enabled: true,
            request_timeout_ms: Some(500),
            connection_timeout_ms: Some(2_000),
            read_from: ReadFrom::AzAffinity,
            connection_backoff: Some(BackoffInfo {
                num_retries: 8,
                factor: 100,
                exponent_base: 2,
                jitter_percent: 20,
            }),
            database_id: 3,
            credentials: Some(AuthInfo {
                username: Some("app".to_string()),
                password: "hunter2".to_string(),
            }),
            periodic_checks: PeriodicChecks::Custom { duration_in_sec: 30 },
            pubsub_subscriptions: vec![
                PubSubSubscription {
                    kind: PubSubKind::Pattern,
                    channel: Bytes::from_static(b"events.*"),
                },
                PubSubSubscription {
                    kind: PubSubKind::Sharded,
                    channel: Bytes::from_static(b"shard-1"),
                },
            ],
            otel: Some(OpenTelemetryConfig {
                traces_endpoint: Some("http://collector:4318".to_string()),
                metrics_endpoint: None,
                sample_percentage: 5,
                flush_interval_ms: 5_000,
            }),
        };
        let bytes = request.to_bytes().unwrap();
        let mut cursor = Cursor::new(bytes.as_ref());
        assert_eq!(ConnectionRequest::decode(&mut cursor).unwrap(), request);
    }

    #[test]
    fn default_port_applied() {
        assert_eq!(NodeAddress::from_host("example.org").port, DEFAULT_PORT);
    }
}
