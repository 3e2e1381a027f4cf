use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Broker address and credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    /// Capacity of the rumqttc request channel.
    pub request_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "feeder-session".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 60,
            request_capacity: 100,
        }
    }
}

/// Topic layout shared by the router and the commander.
///
/// Inbound topics are dot separated (`krs.api.gts.<gateway>`), outbound topics
/// are slash separated (`krs/cmd/stg/<gateway>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub prefix: String,
    pub namespace: String,
    pub stage: String,
    pub subscription: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            prefix: "krs".to_string(),
            namespace: "gts".to_string(),
            stage: "stg".to_string(),
            subscription: "#".to_string(),
        }
    }
}

impl TopicConfig {
    pub fn api_request_prefix(&self) -> String {
        format!("{}.api.{}.", self.prefix, self.namespace)
    }

    pub fn telemetry_prefix(&self) -> String {
        format!("{}.tel.{}.", self.prefix, self.namespace)
    }

    pub fn ack_topic(&self, gateway_id: &str) -> String {
        format!("{}/api/{}/{}", self.prefix, self.stage, gateway_id)
    }

    pub fn command_topic(&self, gateway_id: &str) -> String {
        format!("{}/cmd/{}/{}", self.prefix, self.stage, gateway_id)
    }
}

/// Receive-loop timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub poll_timeout_secs: u64,
    pub stall_threshold_secs: u64,
    pub reconnect_delay_secs: u64,
    pub drain_grace_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: 60,
            stall_threshold_secs: 300,
            reconnect_delay_secs: 5,
            drain_grace_secs: 10,
        }
    }
}

impl SessionConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn stall_threshold(&self) -> Duration {
        Duration::from_secs(self.stall_threshold_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_secs(self.drain_grace_secs)
    }
}
