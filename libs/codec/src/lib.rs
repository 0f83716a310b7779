//! # Fleetbus Wire Codec
//!
//! ## Purpose
//!
//! Encoding rules for the JSON envelope that wraps every message on the bus:
//!
//! ```json
//! {"protocol": "choria:transport:1", "data": "<base64>", "headers": {...}}
//! ```
//!
//! The payload is base64 encoded so it stays opaque to every relay between
//! sender and receiver, federation brokers included.
//!
//! ## What This Crate Does NOT Contain
//! - Subject resolution or header policy (belongs in the connector)
//! - Transport logic (belongs in network/)

pub mod envelope;
pub mod error;

pub use envelope::{decode_payload, encode_payload, Envelope};
pub use error::{CodecError, Result};
