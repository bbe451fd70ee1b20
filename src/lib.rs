pub mod bridge;
pub mod client;
pub mod codec;
pub mod connection;
pub mod frame;
pub mod messages;
pub mod otel;
pub mod pipeline;
pub mod registry;


// Re-export codec traits for direct access
pub use codec::{CodecError, Decodable, Encodable};

// Re-export the main client API for easy access
pub use bridge::{BridgeError, EngineBridge, Value};
pub use client::{
    BatchOptions, ClientBuilder, ClientConfig, ClientError, ClientResult, connect,
};
pub use connection::{ConnState, Connection, DEFAULT_CLOSE_REASON};
pub use messages::{
    ClusterScan, NodeAddress, ReadFrom, RequestError, RequestErrorKind, RequestType, Route,
    ScriptInvocation, SimpleRoute,
};
pub use pipeline::MAX_REQUEST_ARGS_LEN;
