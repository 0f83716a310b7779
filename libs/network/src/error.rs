//! Transport Error Types
//!
//! Error handling for bus transport connections, subscriptions and
//! publishing.

use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Operation needs a live connection
    #[error("Not connected: {operation}")]
    NotConnected { operation: String },

    /// Transport was stopped; no further frames will arrive
    #[error("Connection closed")]
    Closed,

    /// Could not reach or keep a server
    #[error("Connection error: {message} (server: {server:?})")]
    Connection {
        message: String,
        server: Option<String>,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Peer spoke something other than the bus protocol
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    pub fn not_connected(operation: impl Into<String>) -> Self {
        Self::NotConnected {
            operation: operation.into(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>, server: Option<&str>) -> Self {
        Self::Connection {
            message: message.into(),
            server: server.map(str::to_string),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        server: Option<&str>,
        source: std::io::Error,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            server: server.map(str::to_string),
            source: Some(source),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// True when the transport will never deliver again
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// True for failures the transport's reconnect loop may heal
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotConnected { .. } | Self::Connection { .. })
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}
