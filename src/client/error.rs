// ABOUTME: Client error taxonomy covering configuration, connection, request and closing failures
// ABOUTME: Request errors recover locally; closing errors are fatal for the whole connection

use crate::connection::ConnectError;
use crate::messages::RequestError;
use crate::otel::OtelError;
use thiserror::Error;

/// Every failure a caller can observe from the transport core.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The supplied configuration is invalid. Raised synchronously, before
    /// anything touches the native layer.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Establishing the connection failed; the connect future rejects and
    /// no connection exists afterwards.
    #[error("connection error: {0}")]
    Connection(String),

    /// A single request failed; the connection stays usable.
    #[error("request error: {0}")]
    Request(RequestError),

    /// The connection was torn down. Every outstanding future receives the
    /// same diagnostic and later submissions reject immediately.
    #[error("connection closed: {0}")]
    Closing(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl From<ConnectError> for ClientError {
    fn from(err: ConnectError) -> Self {
        ClientError::Connection(err.to_string())
    }
}

impl From<OtelError> for ClientError {
    fn from(err: OtelError) -> Self {
        ClientError::Configuration(err.to_string())
    }
}
