//! # Federation
//!
//! Moves requests from a federation bus into a collective and carries the
//! replies back out. Two processors share the work:
//!
//! - [`FederationProcessor`]: validates requests from the federation, points
//!   their replies at the broker and publishes to the collective targets
//! - [`CollectiveProcessor`]: validates replies from the collective and
//!   publishes them to the reply subject recorded in the federation markup
//!
//! [`FederationBroker`] wires both into a running service; its stats are
//! exposed through [`health_check::StatsSource`].

pub mod broker;
pub mod collective;
pub mod error;
pub mod federation;
pub mod logic;
pub mod processor;
pub mod stats;

pub use broker::{BrokerSettings, FederationBroker};
pub use collective::CollectiveProcessor;
pub use error::{BrokerError, Rejection, Result};
pub use federation::FederationProcessor;
pub use logic::{ProcessorLogic, WorkItem};
pub use processor::{Outbox, Processor, ProcessorState, ProcessorTasks};
pub use stats::ProcessorCounters;
