//! # feeder-session
//!
//! Cloud-side MQTT session engine for pet-feeder gateways.
//!
//! - [`mqtt`]: broker connection, stall detection and reconnect policy
//! - [`routing`]: inbound topic classification, acknowledgments, telemetry
//! - [`tasks`]: supervised fan-out of inbound message handling
//! - [`commands`]: outbound command envelopes and the schedule protocols
//! - [`backends`]: collaborator traits for device and telemetry storage
//! - [`config`]: TOML configuration

pub mod backends;
pub mod commands;
pub mod config;
pub mod mqtt;
pub mod routing;
pub mod tasks;

pub use backends::Backends;
pub use commands::FeederCommander;
pub use config::AppConfig;
pub use mqtt::ConnectionSupervisor;
pub use routing::MessageRouter;
pub use tasks::TaskSupervisor;
