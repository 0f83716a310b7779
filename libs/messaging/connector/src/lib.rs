//! # Connector
//!
//! The addressing and envelope layer between fleet messages and the bus:
//!
//! ```text
//! Message ─► TargetResolver ─► EnvelopeBuilder ─► Envelope ─► Transport
//!                 (subject)        (headers)       (base64)
//! ```
//!
//! A [`ConnectorContext`] holds the process-wide state (identity, networks,
//! reply sequence) and is shared by every component that addresses messages.

pub mod builder;
pub mod connector;
pub mod context;
pub mod error;
pub mod resolver;

pub use builder::EnvelopeBuilder;
pub use connector::Connector;
pub use context::ConnectorContext;
pub use error::{ConnectorError, PublishError, Result};
pub use resolver::TargetResolver;
