mod connection_request;
mod request;
mod request_type;
mod response;
mod route;

pub use connection_request::{
    AuthInfo, BackoffInfo, ConnectionRequest, DEFAULT_PORT, NodeAddress, PeriodicChecks,
    PubSubKind, PubSubSubscription, ReadFrom, TlsMode,
};
pub use request::{ArgsBody, Batch, BatchEntry, ClusterScan, CommandRequest, RequestKind, ScriptInvocation};
pub use request_type::RequestType;
pub use response::{RequestError, RequestErrorKind, Response, ResponsePayload};
pub use route::{Route, SimpleRoute, SlotType};
