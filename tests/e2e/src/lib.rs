//! End-to-End Test Framework for Fleetbus
//!
//! Runs a federated topology in process: a client on the federation bus, a
//! broker between the buses and echo nodes on the collective bus.

pub mod fixtures;
pub mod framework;
pub mod scenarios;

pub use fixtures::FederatedTopology;
pub use framework::{TestConfig, TestFramework, TestMetrics, TestResult, TestScenario};
pub use scenarios::{BroadcastScenario, ChunkedDirectedScenario, RejectionScenario};
