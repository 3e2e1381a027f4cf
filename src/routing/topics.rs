use crate::mqtt::config::TopicConfig;

/// Classification of an inbound topic, borrowing the gateway id from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicMatch<'a> {
    ApiRequest { gateway_id: &'a str },
    Telemetry { gateway_id: &'a str },
    Unmatched,
}

/// Inbound topic matcher: `<prefix>.api.<namespace>.<gateway>` and
/// `<prefix>.tel.<namespace>.<gateway>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPatterns {
    api_request: String,
    telemetry: String,
}

impl TopicPatterns {
    pub fn new(topics: &TopicConfig) -> Self {
        Self {
            api_request: topics.api_request_prefix(),
            telemetry: topics.telemetry_prefix(),
        }
    }

    pub fn classify<'a>(&self, topic: &'a str) -> TopicMatch<'a> {
        if let Some(gateway_id) = gateway_segment(topic, &self.api_request) {
            TopicMatch::ApiRequest { gateway_id }
        } else if let Some(gateway_id) = gateway_segment(topic, &self.telemetry) {
            TopicMatch::Telemetry { gateway_id }
        } else {
            TopicMatch::Unmatched
        }
    }
}

// The gateway id is everything after the prefix, and must not be empty.
fn gateway_segment<'a>(topic: &'a str, prefix: &str) -> Option<&'a str> {
    topic
        .strip_prefix(prefix)
        .filter(|gateway_id| !gateway_id.is_empty())
}
