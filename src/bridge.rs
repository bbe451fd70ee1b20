// ABOUTME: Seam between the transport core and the native engine's foreign entry points
// ABOUTME: Opaque u64 handles denote native-owned memory; each is released by exactly one call

use crate::otel::OpenTelemetryConfig;
use bytes::Bytes;
use std::path::PathBuf;
use thiserror::Error;

/// A value materialised from the native engine.
///
/// The transport core never interprets values beyond the `Okay` and `Nil`
/// sentinels; everything else is carried through to the caller untouched.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Nil,
    /// The constant `"OK"` simple string.
    Okay,
    Int(i64),
    Bulk(Bytes),
    Array(Vec<Value>),
}

/// Failures reported by the native entry points.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("engine startup failed: {0}")]
    Startup(String),

    #[error("materialisation failed: {0}")]
    Materialize(String),

    #[error("opentelemetry initialisation failed: {0}")]
    Otel(String),
}

/// Synchronous entry points into the native engine.
///
/// All methods are called from async contexts and must not block beyond a
/// plain foreign call. The two pointer-shaped handles obey a strict
/// ownership rule: `store_args` transfers the argument vector to the native
/// side and the returned handle is consumed by encoding it into a request;
/// `materialize` consumes a response handle and releases the native
/// allocation behind it. Dropping a handle without its consuming call leaks
/// native memory.
pub trait EngineBridge: Send + Sync + 'static {
    /// Start the native transport and return the filesystem path of the
    /// stream endpoint to connect to.
    fn start_transport(&self) -> Result<PathBuf, BridgeError>;

    /// Intern a large argument vector on the native side, returning the
    /// opaque handle to reference it on the wire.
    fn store_args(&self, args: Vec<Bytes>) -> u64;

    /// Turn a response handle into a language-level value, releasing the
    /// underlying native allocation.
    fn materialize(&self, resp_pointer: u64) -> Result<Value, BridgeError>;

    /// Initialise the native OpenTelemetry exporter. Process-wide and
    /// once-only; see [`crate::otel::init`].
    fn init_otel(&self, config: &OpenTelemetryConfig) -> Result<(), BridgeError>;

    /// Release a cluster-scan cursor the caller will not iterate further.
    fn release_cursor(&self, cursor_id: Bytes);
}
