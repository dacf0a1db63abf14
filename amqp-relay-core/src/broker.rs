// amqp-relay-core/src/broker.rs
use std::sync::Arc;

use async_trait::async_trait;

use crate::{ConnectionConfig, OutboundMessage, RelayError};

/// Invoked by the broker client whenever a channel faults asynchronously.
/// May run on a thread owned by the client rather than on the relay's runtime.
pub type ChannelErrorCallback = Box<dyn Fn(RelayError) + Send + Sync>;

/// Entry point to a message broker.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn BrokerConnection>, RelayError>;
}

#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// The returned channel keeps its connection alive until closed or dropped.
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, RelayError>;
}

#[async_trait]
pub trait BrokerChannel: Send + Sync {
    fn on_error(&self, callback: ChannelErrorCallback);

    /// Declares a topic exchange, creating it if absent.
    async fn assert_exchange(&self, name: &str, durable: bool) -> Result<(), RelayError>;

    /// Passive declare: fails if the exchange does not exist.
    async fn check_exchange(&self, name: &str) -> Result<(), RelayError>;

    /// Hands the message to the client without waiting for a broker acknowledgement.
    async fn publish(&self, exchange: &str, message: &OutboundMessage) -> Result<(), RelayError>;

    /// Closes the channel and its connection. Failures are swallowed.
    async fn close(&self);
}
