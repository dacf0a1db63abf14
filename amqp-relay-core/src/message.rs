// amqp-relay-core/src/message.rs

/// Header consumed by the broker's delayed-message exchange plugin.
pub const DELAY_HEADER: &str = "x-delay";

/// A single message handed to the exchange. Built per event, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub routing_key: String,
    pub body: Vec<u8>,
    pub delay_header_ms: Option<u64>,
}

impl OutboundMessage {
    /// A delay of zero means no header at all.
    pub fn new(routing_key: String, body: Vec<u8>, delay_ms: u64) -> Self {
        Self {
            routing_key,
            body,
            delay_header_ms: (delay_ms > 0).then_some(delay_ms),
        }
    }
}

pub fn routing_key(prefix: &str, event: &str) -> String {
    format!("{prefix}{event}")
}
