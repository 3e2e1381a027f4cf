//! # Message Router
//!
//! Turns an inbound topic and payload into a [`RoutedMessage`] and acts on it:
//! API requests are acknowledged on the mirrored gateway topic, telemetry is
//! forwarded to the backend collaborators, everything else is logged and
//! dropped.
//!
//! Classification is pure ([`MessageRouter::classify`]); only
//! [`MessageRouter::route`] performs I/O. A payload that fails to decode on a
//! matched topic is dropped with a warning, never escalated: there is no
//! redelivery at this layer, so retrying would not help.

pub mod telemetry;
pub mod topics;

use crate::backends::{Backends, StoreError};
use crate::mqtt::config::TopicConfig;
use crate::mqtt::transport::{Publisher, TransportError};
use rumqttc::QoS;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use telemetry::{parse_report, TelemetryReport};
use thiserror::Error;
use topics::{TopicMatch, TopicPatterns};
use tracing::{debug, info, warn};

const ACK_EVENT_NAME: &str = "GatewayToServer_ApiRequest";
const ACK_STATUS_OK: &str = "OK";

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Missing field {0}")]
    MissingField(String),

    #[error("Field {field} is not a {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    #[error("Failed to encode acknowledgment: {0}")]
    EncodeAck(#[source] serde_json::Error),

    #[error("Failed to publish acknowledgment: {0}")]
    Publish(#[from] TransportError),

    #[error("Backend rejected telemetry: {0}")]
    Store(#[from] StoreError),
}

impl RouteError {
    /// True for errors caused by the payload itself rather than by I/O.
    pub fn is_malformed(&self) -> bool {
        !matches!(
            self,
            RouteError::EncodeAck(_) | RouteError::Publish(_) | RouteError::Store(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoutedMessage {
    ApiRequest { gateway_id: String, request_id: Value },
    Telemetry { gateway_id: String, report: TelemetryReport },
    Unrecognized { topic: String },
}

#[derive(Serialize)]
struct ApiAck<'a> {
    #[serde(rename = "requestId")]
    request_id: &'a Value,
    #[serde(rename = "eventName")]
    event_name: &'static str,
    encrypted: bool,
    parameters: AckParameters,
}

#[derive(Serialize)]
struct AckParameters {
    status: &'static str,
}

/// Holds the publisher handle and the backend collaborators; nothing else.
pub struct MessageRouter {
    patterns: TopicPatterns,
    topics: TopicConfig,
    publisher: Arc<dyn Publisher>,
    backends: Backends,
}

impl MessageRouter {
    pub fn new(topics: TopicConfig, publisher: Arc<dyn Publisher>, backends: Backends) -> Self {
        Self {
            patterns: TopicPatterns::new(&topics),
            topics,
            publisher,
            backends,
        }
    }

    pub fn classify(&self, topic: &str, payload: &[u8]) -> Result<RoutedMessage, RouteError> {
        match self.patterns.classify(topic) {
            TopicMatch::ApiRequest { gateway_id } => {
                let fields = decode_object(payload)?;
                let request_id = fields
                    .get("requestId")
                    .cloned()
                    .ok_or_else(|| RouteError::MissingField("requestId".to_string()))?;
                Ok(RoutedMessage::ApiRequest {
                    gateway_id: gateway_id.to_string(),
                    request_id,
                })
            }
            TopicMatch::Telemetry { gateway_id } => {
                let fields = decode_object(payload)?;
                Ok(RoutedMessage::Telemetry {
                    gateway_id: gateway_id.to_string(),
                    report: parse_report(gateway_id, &fields)?,
                })
            }
            TopicMatch::Unmatched => Ok(RoutedMessage::Unrecognized {
                topic: topic.to_string(),
            }),
        }
    }

    /// Classifies and handles one inbound message.
    ///
    /// Malformed payloads are logged and dropped (`Ok`); only backend and
    /// publish failures are returned.
    pub async fn route(&self, topic: &str, payload: &[u8]) -> Result<(), RouteError> {
        let message = match self.classify(topic, payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    "Failed to decode message on {}: {} ({})",
                    topic,
                    e,
                    String::from_utf8_lossy(payload)
                );
                return Ok(());
            }
        };
        self.handle(message).await
    }

    pub async fn handle(&self, message: RoutedMessage) -> Result<(), RouteError> {
        match message {
            RoutedMessage::ApiRequest {
                gateway_id,
                request_id,
            } => self.acknowledge(&gateway_id, &request_id).await,
            RoutedMessage::Telemetry { gateway_id, report } => {
                self.commit_telemetry(&gateway_id, report).await
            }
            RoutedMessage::Unrecognized { topic } => {
                info!("Unknown message on {}", topic);
                Ok(())
            }
        }
    }

    async fn acknowledge(&self, gateway_id: &str, request_id: &Value) -> Result<(), RouteError> {
        let ack = ApiAck {
            request_id,
            event_name: ACK_EVENT_NAME,
            encrypted: false,
            parameters: AckParameters {
                status: ACK_STATUS_OK,
            },
        };
        let payload = serde_json::to_vec(&ack).map_err(RouteError::EncodeAck)?;
        let topic = self.topics.ack_topic(gateway_id);
        debug!("Publishing MQTT ACK for request {} to {}", request_id, topic);
        self.publisher
            .publish(&topic, QoS::ExactlyOnce, payload)
            .await?;
        Ok(())
    }

    async fn commit_telemetry(
        &self,
        gateway_id: &str,
        report: TelemetryReport,
    ) -> Result<(), RouteError> {
        match report {
            TelemetryReport::Heartbeat { device_id } => {
                debug!("Sending ping for {}", device_id);
                self.backends
                    .registry
                    .record_heartbeat(gateway_id, &device_id)
                    .await?;
            }
            TelemetryReport::Sensor(sensor) => {
                debug!("Updating sensor information for {}", sensor.device_id);
                self.backends.telemetry.record_sensor_report(sensor).await?;
            }
            TelemetryReport::FeedResult(result) => {
                info!("Committing feed result data for {}", result.device_id);
                self.backends.feeding.record_feed_result(result).await?;
            }
            TelemetryReport::Other {
                device_id,
                message_type,
            } => {
                debug!("Ignoring {} telemetry from {}", message_type, device_id);
            }
        }
        Ok(())
    }
}

fn decode_object(payload: &[u8]) -> Result<Map<String, Value>, RouteError> {
    let text = std::str::from_utf8(payload)?;
    match serde_json::from_str::<Value>(text)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(RouteError::NotAnObject),
    }
}
