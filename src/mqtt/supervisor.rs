//! # Connection Supervisor
//!
//! Keeps exactly one broker session alive for the lifetime of the process.
//!
//! ## Why Two Timers
//!
//! Brokers can drop a session without the client ever seeing a protocol error,
//! and keepalive pings alone do not surface that. The receive loop therefore
//! waits with a short poll timeout (60 s by default) that only re-polls, and
//! measures the time since the last real message against a long stall
//! threshold (300 s by default). Only crossing the stall threshold forces a
//! reconnect, so an idle but healthy session is left alone.
//!
//! ## Failure Handling
//!
//! - Connect or subscribe failure: log, wait the reconnect delay, retry. Forever.
//! - Stall: force a disconnect and reconnect immediately.
//! - Receive error: force a disconnect, wait the reconnect delay, reconnect.
//!
//! Inbound messages never block the loop: each one is handed to the
//! [`TaskSupervisor`] and the loop goes straight back to polling.

use super::config::SessionConfig;
use super::link::{Disconnected, Link, LinkFailure, PollOutcome, Receiving};
use super::message::InboundMessage;
use super::status::{ConnectionState, SessionStatus};
use super::transport::{Transport, TransportError};
use crate::routing::MessageRouter;
use crate::tasks::TaskSupervisor;
use rumqttc::QoS;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// QoS 2's four-way handshake stalls under heavy inbound volume.
const SUBSCRIPTION_QOS: QoS = QoS::AtLeastOnce;

enum SessionEnd {
    Stalled(Duration),
    Failed(TransportError),
}

pub struct ConnectionSupervisor {
    link: Link<Disconnected>,
    driver: SessionDriver,
}

struct SessionDriver {
    config: SessionConfig,
    subscription: String,
    router: Arc<MessageRouter>,
    tasks: TaskSupervisor,
    status: watch::Sender<SessionStatus>,
}

impl ConnectionSupervisor {
    pub fn new(
        transport: Box<dyn Transport>,
        config: SessionConfig,
        subscription: impl Into<String>,
        router: Arc<MessageRouter>,
        tasks: TaskSupervisor,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());
        ConnectionSupervisor {
            link: Link::create(transport),
            driver: SessionDriver {
                config,
                subscription: subscription.into(),
                router,
                tasks,
                status,
            },
        }
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.driver.status.subscribe()
    }

    pub fn tasks(&self) -> TaskSupervisor {
        self.driver.tasks.clone()
    }

    /// Runs the session forever. Shutdown is done by dropping the future.
    pub async fn run(self) {
        let ConnectionSupervisor { link, driver } = self;
        driver.run(link).await
    }
}

impl SessionDriver {
    async fn run(&self, mut idle: Link<Disconnected>) {
        let reconnect_delay = self.config.reconnect_delay();

        loop {
            let connecting = idle.reconnect();
            self.update(|status| {
                status.connection_state = ConnectionState::Connecting;
                status.connect_attempts += 1;
            });
            debug!("Connecting to MQTT broker");

            let subscribed = match connecting
                .establish(&self.subscription, SUBSCRIPTION_QOS)
                .await
            {
                Ok(subscribed) => subscribed,
                Err(LinkFailure { link, error }) => {
                    error!(
                        "MQTT connect failed, retrying in {}s: {}",
                        reconnect_delay.as_secs(),
                        error
                    );
                    self.update(|status| {
                        status.connection_state = ConnectionState::Disconnected;
                        status.failures += 1;
                        status.last_error = Some(error.to_string());
                    });
                    idle = link;
                    tokio::time::sleep(reconnect_delay).await;
                    continue;
                }
            };

            self.update(|status| status.connection_state = ConnectionState::Subscribed);
            info!(
                "MQTT client connected and subscribed to {:?}",
                subscribed.subscriptions()
            );

            let receiving = subscribed.start_receiving();
            self.update(|status| status.connection_state = ConnectionState::Receiving);

            let (link, end) = self.receive(receiving).await;
            idle = link;

            match end {
                SessionEnd::Stalled(silence) => {
                    debug!("Reconnecting after {}s of silence", silence.as_secs());
                    self.update(|status| {
                        status.connection_state = ConnectionState::Disconnected;
                        status.stalls += 1;
                    });
                }
                SessionEnd::Failed(error) => {
                    error!(
                        "MQTT client error, reconnecting in {}s: {}",
                        reconnect_delay.as_secs(),
                        error
                    );
                    self.update(|status| {
                        status.connection_state = ConnectionState::Disconnected;
                        status.failures += 1;
                        status.last_error = Some(error.to_string());
                    });
                    tokio::time::sleep(reconnect_delay).await;
                }
            }
        }
    }

    async fn receive(&self, mut link: Link<Receiving>) -> (Link<Disconnected>, SessionEnd) {
        let poll_timeout = self.config.poll_timeout();
        let stall_threshold = self.config.stall_threshold();

        loop {
            match link.poll(poll_timeout).await {
                Ok(PollOutcome::Message(message)) => {
                    self.update(|status| {
                        status.messages_received += 1;
                        status.last_activity = Some(message.received_at);
                    });
                    self.dispatch(message);
                }
                Ok(PollOutcome::Idle {
                    since_last_message,
                    consecutive_timeouts,
                }) => {
                    if since_last_message > stall_threshold {
                        warn!(
                            "No MQTT messages received in {} seconds, forcing reconnect",
                            since_last_message.as_secs()
                        );
                        return (link.close().await, SessionEnd::Stalled(since_last_message));
                    }

                    if consecutive_timeouts % 3 == 0 {
                        debug!(
                            "MQTT client: {} consecutive timeouts, {}s since last message",
                            consecutive_timeouts,
                            since_last_message.as_secs()
                        );
                    }
                }
                Err(error) => {
                    return (link.close().await, SessionEnd::Failed(error));
                }
            }
        }
    }

    fn dispatch(&self, message: InboundMessage) {
        debug!("Dispatching {}", message);
        let router = self.router.clone();
        let label = format!("message on {}", message.topic);
        self.tasks.dispatch(label, async move {
            router.route(&message.topic, &message.payload).await
        });
    }

    fn update(&self, modify: impl FnOnce(&mut SessionStatus)) {
        self.status.send_modify(modify);
    }
}
