use chrono::{DateTime, Local};
use std::fmt;

const PREVIEW_LEN: usize = 64;

/// A publish received from the broker, detached from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Local>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Local::now(),
        }
    }

    pub fn from_publish(publish: rumqttc::Publish) -> Self {
        Self::new(publish.topic, publish.payload.to_vec())
    }

    /// Lossy, truncated rendering of the payload for log lines.
    pub fn preview(&self) -> String {
        let text = String::from_utf8_lossy(&self.payload);
        if text.chars().count() > PREVIEW_LEN {
            let head: String = text.chars().take(PREVIEW_LEN).collect();
            format!("{}...", head)
        } else {
            text.into_owned()
        }
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.received_at.format("%H:%M:%S%.3f"),
            self.topic,
            self.preview()
        )
    }
}
