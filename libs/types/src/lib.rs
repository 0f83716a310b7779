//! # Fleetbus Types
//!
//! Shared type system for the fleetbus messaging layer: the unit of work
//! handed to the connector ([`Message`]), the header set carried in every
//! envelope ([`Headers`]), provenance hops ([`Hop`]), federation markup
//! ([`FederationMarkup`]) and the resolved destination of a send ([`Target`]).
//!
//! ## Layering
//!
//! ```text
//! libs/types → libs/codec → libs/messaging/connector → libs/messaging/federation
//!     ↑             ↓                 ↓
//! Pure data    Wire envelope     Addressing, publish/receive
//! ```
//!
//! Nothing in this crate performs I/O. Payloads are opaque byte blobs; the
//! only structure this layer understands is the header set.

pub mod error;
pub mod headers;
pub mod kind;
pub mod message;
pub mod subjects;
pub mod target;

pub use error::{Result, TypesError};
pub use headers::{FederationMarkup, Headers, Hop};
pub use kind::MessageKind;
pub use message::Message;
pub use target::Target;

/// Protocol tag written into every wire envelope.
pub const PROTOCOL: &str = "choria:transport:1";

/// Maximum number of directed hosts carried by one federation envelope.
pub const FEDERATION_BATCH_SIZE: usize = 200;
