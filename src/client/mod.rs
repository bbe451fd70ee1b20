// ABOUTME: Public client surface: connect plus the configuration and error types
// ABOUTME: Command catalogues, routing policy and pub/sub management live above this crate

//! Client entry points.
//!
//! The transport core exposes a deliberately small surface:
//!
//! * [`connect`] — run the bootstrap handshake, return a ready [`Connection`]
//! * [`Connection::submit`] — send one framed request, await its value
//! * [`Connection::submit_batch`] — send a pipeline or transaction
//! * [`Connection::close`] — tear the connection down
//!
//! Everything else (command builders, cluster routing decisions, pub/sub
//! bookkeeping, retries) belongs to the layers above and reaches the core
//! only through these calls.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use valkey_link::{ClientConfig, NodeAddress, RequestType, connect};
//!
//! # async fn example(bridge: Arc<dyn valkey_link::EngineBridge>) -> valkey_link::ClientResult<()> {
//! let config = ClientConfig::new(vec![NodeAddress::from_host("localhost")]);
//! let connection = connect(config, bridge).await?;
//! let pong = connection.submit(RequestType::Ping, Vec::new(), None).await?;
//! println!("{pong:?}");
//! connection.close(None);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod error;
pub mod types;

pub use builder::ClientBuilder;
pub use error::{ClientError, ClientResult};
pub use types::{AdvancedConfig, BatchOptions, ClientConfig, DEFAULT_CONNECTION_TIMEOUT};

use crate::bridge::EngineBridge;
use crate::connection::Connection;
use std::sync::Arc;

/// Establish a connection to the native engine.
///
/// Validates the configuration synchronously, asks the bridge for the
/// engine's socket path, runs the single-frame handshake under the
/// configured connection timeout and returns a connection in the `Ready`
/// state. Any failure rejects the future with a typed [`ClientError`]; no
/// connection exists afterwards.
pub async fn connect(
    config: ClientConfig,
    bridge: Arc<dyn EngineBridge>,
) -> ClientResult<Connection> {
    config.validate()?;
    let request = config.to_connection_request();
    Connection::establish(&request, config.connection_timeout, bridge)
        .await
        .map_err(ClientError::from)
}
