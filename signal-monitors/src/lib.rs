//! Signal Monitors
//!
//! Everything a monitor needs to plug into the supervisor:
//! - `SignalProducer`, the one-cycle fetch → analyze → emit contract
//! - `MonitorSpec` / `MonitorRegistry`, the validated, immutable monitor set
//! - `SignalSink` implementations that receive emitted signals
//! - the concrete on-chain, exchange, options and macro-calendar monitors

pub mod config;
pub mod http;
pub mod monitors;
pub mod producer;
pub mod registry;
pub mod sink;

pub use config::MonitorsConfig;
pub use producer::{MonitorSpec, SignalProducer};
pub use registry::{MonitorRegistry, RegistryBuilder};
pub use sink::{BroadcastSink, FanoutSink, LogSink, SignalSink, SignalTape};

// Re-export common types for convenience
pub use common::Signal;
