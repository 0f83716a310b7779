//! # Fleetbus Configuration
//!
//! Layered configuration for connectors and federation brokers: a TOML file
//! first, then `FLEETBUS_*` environment variables.
//!
//! ## Usage
//!
//! ```no_run
//! use fleetbus_config::FleetConfig;
//!
//! let config = FleetConfig::load("~/.fleetbus/broker.toml".as_ref())?;
//! let broker = config.broker()?;
//! println!("serving {}", broker.cluster);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod fleet_config;

pub use fleet_config::{
    BrokerConfig, ConnectorConfig, FleetConfig, SideConfig, TlsConfig, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_RECONNECT_WAIT_MS,
};
