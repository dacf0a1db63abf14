// amqp-relay-core/src/handler.rs
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, event: &str, payload: &Value);
}

/// Host side of the subscription: where handlers get bound to event names.
pub trait EventSource {
    fn subscribe(&mut self, event: &'static str, handler: Arc<dyn EventHandler>);
}
