//! Typestate wrapper around the transport session.
//!
//! ```text
//! Disconnected ──► Connecting ──► Subscribed ──► Receiving
//!       ▲               │                            │
//!       └───────────────┴────────────────────────────┘
//!            (connect failure / stall / receive error)
//! ```
//!
//! The link is created once and reset on every reconnect; the transport handle
//! inside it is never rebuilt, only reconnected.

use super::message::InboundMessage;
use super::transport::{Transport, TransportError};
use rumqttc::QoS;
use statum::{machine, state};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[state]
#[derive(Debug, Clone)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Subscribed,
    Receiving,
}

#[machine]
pub struct Link<S: LinkState> {
    transport: Box<dyn Transport>,

    // Filters the broker has acknowledged for the current connection
    subscriptions: Vec<String>,

    last_message: Instant,

    consecutive_timeouts: u32,
}

impl<S: LinkState> Link<S> {
    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }
}

/// A failed connection attempt, handing the reset link back to the caller.
pub struct LinkFailure {
    pub link: Link<Disconnected>,
    pub error: TransportError,
}

/// Result of one bounded wait in the receive loop.
#[derive(Debug)]
pub enum PollOutcome {
    Message(InboundMessage),
    Idle {
        since_last_message: Duration,
        consecutive_timeouts: u32,
    },
}

impl Link<Disconnected> {
    pub fn create(transport: Box<dyn Transport>) -> Self {
        Self::new(
            transport,
            Vec::new(),     // subscriptions
            Instant::now(), // last_message
            0,              // consecutive_timeouts
        )
    }

    pub fn reconnect(mut self) -> Link<Connecting> {
        self.subscriptions.clear();
        self.consecutive_timeouts = 0;
        self.transition()
    }
}

impl Link<Connecting> {
    /// Connects and subscribes. Either both succeed or the link falls back to
    /// `Disconnected`.
    pub async fn establish(mut self, filter: &str, qos: QoS) -> Result<Link<Subscribed>, LinkFailure> {
        if let Err(error) = self.transport.connect().await {
            return Err(self.fail(error));
        }

        if let Err(error) = self.transport.subscribe(filter, qos).await {
            if let Err(e) = self.transport.disconnect().await {
                debug!("Ignoring disconnect error after failed subscribe: {}", e);
            }
            return Err(self.fail(error));
        }

        self.subscriptions.push(filter.to_string());
        Ok(self.transition())
    }

    fn fail(self, error: TransportError) -> LinkFailure {
        LinkFailure {
            link: self.transition(),
            error,
        }
    }
}

impl Link<Subscribed> {
    pub fn start_receiving(mut self) -> Link<Receiving> {
        self.last_message = Instant::now();
        self.consecutive_timeouts = 0;
        self.transition()
    }
}

impl Link<Receiving> {
    /// Waits at most `timeout` for the next inbound message.
    pub async fn poll(&mut self, timeout: Duration) -> Result<PollOutcome, TransportError> {
        match tokio::time::timeout(timeout, self.transport.recv()).await {
            Ok(Ok(message)) => {
                self.last_message = Instant::now();
                self.consecutive_timeouts = 0;
                Ok(PollOutcome::Message(message))
            }
            Ok(Err(error)) => Err(error),
            Err(_) => {
                self.consecutive_timeouts += 1;
                Ok(PollOutcome::Idle {
                    since_last_message: self.last_message.elapsed(),
                    consecutive_timeouts: self.consecutive_timeouts,
                })
            }
        }
    }

    /// Best-effort disconnect; secondary errors are swallowed.
    pub async fn close(mut self) -> Link<Disconnected> {
        if let Err(e) = self.transport.disconnect().await {
            debug!("Ignoring error during forced disconnect: {}", e);
        }
        self.subscriptions.clear();
        self.transition()
    }
}
