//! Control bus for a coedit document: wire envelopes, command dispatch, a
//! single-task host and a correlating client.

pub mod client;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod protocol;

pub use client::BusClient;
pub use dispatch::dispatch;
pub use error::BusError;
pub use host::{BusHost, HostHandle};
pub use protocol::{
    Command, EventEnvelope, EventKind, HostMessage, RequestEnvelope, RequestId, ResponseEnvelope,
    StreamFilter,
};
