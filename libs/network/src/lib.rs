//! Network Infrastructure
//!
//! Bus transports shared by the connector and the federation broker. Every
//! transport implements [`Transport`]; the broker picks one at startup and
//! everything above it is transport agnostic.

pub mod error;
pub mod transports;

pub use error::{Result, TransportError};
pub use transports::{
    ConnectOptions, ConnectionState, Frame, MemoryCluster, MemoryTransport, NatsTransport,
    StatsTracker, TlsContext, Transport, TransportStats, DEFAULT_RECONNECT_WAIT,
};
