// amqp-relay-core/src/publisher.rs
use async_trait::async_trait;

use crate::OutboundMessage;

/// Fire-and-forget sink for outbound messages. Implementations never report
/// failures back to the caller.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: OutboundMessage);
}
