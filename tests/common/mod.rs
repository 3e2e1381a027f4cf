#![allow(dead_code)]

use async_trait::async_trait;
use feeder_session::mqtt::{InboundMessage, Publisher, Transport, TransportError};
use rumqttc::QoS;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub qos: QoS,
    pub payload: Vec<u8>,
}

impl Published {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).expect("published payload is JSON")
    }
}

/// Records every publish; optionally fails once a number of publishes went out.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Published>>,
    fail_after: Mutex<Option<usize>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_after(successes: usize) -> Arc<Self> {
        let publisher = Self::default();
        *publisher.fail_after.lock().unwrap() = Some(successes);
        Arc::new(publisher)
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut published = self.published.lock().unwrap();
        if let Some(limit) = *self.fail_after.lock().unwrap() {
            if published.len() >= limit {
                return Err(TransportError::NotConnected);
            }
        }
        published.push(Published {
            topic: topic.to_string(),
            qos,
            payload,
        });
        Ok(())
    }
}

#[derive(Default)]
struct MockCounters {
    connects: AtomicUsize,
    subscribes: AtomicUsize,
    disconnects: AtomicUsize,
    failing_connects: AtomicUsize,
    subscriptions: Mutex<Vec<(String, QoS)>>,
}

/// Transport driven by the test through a [`MockHandle`].
pub struct MockTransport {
    counters: Arc<MockCounters>,
    inbound: mpsc::UnboundedReceiver<Result<InboundMessage, TransportError>>,
}

#[derive(Clone)]
pub struct MockHandle {
    counters: Arc<MockCounters>,
    inbound: mpsc::UnboundedSender<Result<InboundMessage, TransportError>>,
}

pub fn mock_transport() -> (MockTransport, MockHandle) {
    let counters = Arc::new(MockCounters::default());
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MockTransport {
            counters: counters.clone(),
            inbound: rx,
        },
        MockHandle {
            counters,
            inbound: tx,
        },
    )
}

impl MockHandle {
    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.counters.disconnects.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.counters.subscriptions.lock().unwrap().clone()
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.counters.failing_connects.store(count, Ordering::SeqCst);
    }

    pub fn deliver(&self, topic: &str, payload: &[u8]) {
        let _ = self.inbound.send(Ok(InboundMessage::new(topic, payload)));
    }

    pub fn fail_receive(&self, reason: &str) {
        let _ = self.inbound.send(Err(TransportError::Other(reason.to_string())));
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        let remaining = self.counters.failing_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.counters
                .failing_connects
                .store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Other("connection refused".to_string()));
        }
        Ok(())
    }

    async fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), TransportError> {
        self.counters.subscribes.fetch_add(1, Ordering::SeqCst);
        self.counters
            .subscriptions
            .lock()
            .unwrap()
            .push((filter.to_string(), qos));
        Ok(())
    }

    async fn recv(&mut self) -> Result<InboundMessage, TransportError> {
        match self.inbound.recv().await {
            Some(next) => next,
            None => std::future::pending().await,
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Polls `check` until it holds or a generous deadline passes.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
