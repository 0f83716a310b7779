//! # Broker Stats
//!
//! Stats reporting for the federation broker:
//!
//! - [`StatsReporter`] builds the stats document, recomputed on every query
//! - [`StatsServer`] serves it as pretty JSON over HTTP
//!
//! ## Endpoints
//!
//! - `GET /stats` (and `GET /`) - full stats document
//! - any other path - 404, any other method - 405
//!
//! ## Usage
//!
//! ```rust,no_run
//! use health_check::{ReporterInfo, StatsReporter, StatsServer, StatsSource};
//! use std::sync::Arc;
//!
//! # async fn run(source: Arc<dyn StatsSource>) -> anyhow::Result<()> {
//! let info = ReporterInfo {
//!     version: env!("CARGO_PKG_VERSION").into(),
//!     cluster: "production".into(),
//!     instance: "broker1".into(),
//!     config_file: None,
//! };
//! let reporter = Arc::new(StatsReporter::new(info, source));
//! StatsServer::new(reporter, 8222).start().await?;
//! # Ok(())
//! # }
//! ```

pub mod server;
pub mod stats;

pub use server::StatsServer;
pub use stats::{
    BrokerStats, ProcessorSnapshot, ReporterInfo, StatsReporter, StatsSource, STATUS_ERROR,
    STATUS_OK, STATUS_UNKNOWN,
};
