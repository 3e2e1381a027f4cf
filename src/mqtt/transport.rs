//! Transport seam between the session engine and the MQTT client library.
//!
//! The connection supervisor only needs five things from the wire: connect,
//! subscribe, receive the next publish, disconnect, and publish from any task.
//! Receiving is exclusive to the supervisor ([`Transport`]); publishing is a
//! cloneable handle shared with the router and the commander ([`Publisher`]).
//!
//! [`MqttTransport`] implements both on top of `rumqttc`. Each connect builds a
//! fresh `AsyncClient`/`EventLoop` pair and swaps the client into the shared
//! publisher slot once the broker has acknowledged the connection.

use super::config::BrokerConfig;
use super::message::InboundMessage;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeReasonCode};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace};

const DISCONNECT_FLUSH: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("Client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("Broker rejected subscription to {0}")]
    SubscriptionRejected(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Transport failure: {0}")]
    Other(String),
}

/// Receive side of the session, owned by the connection supervisor.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;

    async fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), TransportError>;

    /// Waits for the next inbound publish. Protocol traffic (pings, acks) is
    /// consumed internally.
    async fn recv(&mut self) -> Result<InboundMessage, TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// Publish side of the session, shared by every task that needs to send.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>)
        -> Result<(), TransportError>;
}

#[derive(Clone, Default, Debug)]
pub struct MqttPublisher {
    client: Arc<RwLock<Option<AsyncClient>>>,
}

impl MqttPublisher {
    async fn attach(&self, client: AsyncClient) {
        *self.client.write().await = Some(client);
    }

    async fn detach(&self) {
        self.client.write().await.take();
    }

    pub async fn is_attached(&self) -> bool {
        self.client.read().await.is_some()
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let client = self
            .client
            .read()
            .await
            .clone()
            .ok_or(TransportError::NotConnected)?;
        client.publish(topic, qos, false, payload).await?;
        Ok(())
    }
}

pub struct MqttTransport {
    options: MqttOptions,
    capacity: usize,
    client: Option<AsyncClient>,
    eventloop: Option<EventLoop>,
    pending: VecDeque<InboundMessage>,
    publisher: MqttPublisher,
}

impl MqttTransport {
    /// Builds the transport and the publisher handle bound to it.
    pub fn new(config: &BrokerConfig) -> (Self, MqttPublisher) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(1)));
        if let Some(username) = &config.username {
            options.set_credentials(username, config.password.clone().unwrap_or_default());
        }

        let publisher = MqttPublisher::default();
        let transport = MqttTransport {
            options,
            capacity: config.request_capacity.max(1),
            client: None,
            eventloop: None,
            pending: VecDeque::new(),
            publisher: publisher.clone(),
        };
        (transport, publisher)
    }

    async fn poll(&mut self) -> Result<Event, TransportError> {
        let eventloop = self.eventloop.as_mut().ok_or(TransportError::NotConnected)?;
        Ok(eventloop.poll().await?)
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.pending.clear();
        let (client, eventloop) = AsyncClient::new(self.options.clone(), self.capacity);
        self.eventloop = Some(eventloop);

        loop {
            match self.poll().await? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    debug!("Broker acknowledged connection: {:?}", ack.code);
                    break;
                }
                event => trace!("Ignoring event while connecting: {:?}", event),
            }
        }

        self.publisher.attach(client.clone()).await;
        self.client = Some(client);
        Ok(())
    }

    async fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), TransportError> {
        let client = self.client.clone().ok_or(TransportError::NotConnected)?;
        client.subscribe(filter, qos).await?;

        loop {
            match self.poll().await? {
                Event::Incoming(Packet::SubAck(ack)) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        return Err(TransportError::SubscriptionRejected(filter.to_string()));
                    }
                    debug!("Subscribed to {} ({:?})", filter, ack.return_codes);
                    return Ok(());
                }
                Event::Incoming(Packet::Publish(publish)) => {
                    self.pending.push_back(InboundMessage::from_publish(publish));
                }
                event => trace!("Ignoring event while subscribing: {:?}", event),
            }
        }
    }

    async fn recv(&mut self) -> Result<InboundMessage, TransportError> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(message);
        }

        loop {
            match self.poll().await? {
                Event::Incoming(Packet::Publish(publish)) => {
                    return Ok(InboundMessage::from_publish(publish));
                }
                event => trace!("MQTT event: {:?}", event),
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.publisher.detach().await;
        self.pending.clear();

        let client = self.client.take();
        let eventloop = self.eventloop.take();
        if let (Some(client), Some(mut eventloop)) = (client, eventloop) {
            client.try_disconnect()?;
            // Give the event loop one chance to put DISCONNECT on the wire.
            let _ = tokio::time::timeout(DISCONNECT_FLUSH, eventloop.poll()).await;
        }
        Ok(())
    }
}
