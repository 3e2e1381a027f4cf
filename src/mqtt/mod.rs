//! # MQTT Session Module
//!
//! Everything that touches the broker connection lives here.
//!
//! ```text
//! mqtt/
//! ├── config.rs      - Broker, topic and timing configuration
//! ├── message.rs     - Inbound message representation
//! ├── transport.rs   - Transport/Publisher seam and the rumqttc implementation
//! ├── link.rs        - Typestate session (Disconnected → Connecting → Subscribed → Receiving)
//! ├── status.rs      - Observable connection status
//! └── supervisor.rs  - Receive loop, stall detection and reconnect policy
//! ```
//!
//! The supervisor is the only owner of the receive side. Publishing goes through
//! a cloneable [`transport::Publisher`] handle so that acknowledgments and
//! commands can be sent from any task without touching session state.

pub mod config;
pub mod link;
pub mod message;
pub mod status;
pub mod supervisor;
pub mod transport;

pub use config::{BrokerConfig, SessionConfig, TopicConfig};
pub use message::InboundMessage;
pub use status::{ConnectionState, SessionStatus};
pub use supervisor::ConnectionSupervisor;
pub use transport::{MqttPublisher, MqttTransport, Publisher, Transport, TransportError};
