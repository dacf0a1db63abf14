// amqp-relay-core/src/router.rs
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::catalog::EVENT_CATALOG;
use crate::message::routing_key;
use crate::{ConnectionConfig, EnabledEventSet, EventHandler, EventSource, OutboundMessage, Publisher};

/// Filters host events against the enabled set and turns the survivors into
/// outbound messages.
pub struct EventRouter {
    enabled: EnabledEventSet,
    routing_prefix: String,
    publish_delay_ms: u64,
    publisher: Arc<dyn Publisher>,
}

impl EventRouter {
    pub fn new(config: &ConnectionConfig, enabled: EnabledEventSet, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            enabled,
            routing_prefix: config.routing_prefix.clone(),
            publish_delay_ms: config.publish_delay_ms,
            publisher,
        }
    }

    /// Binds the router to every catalog event. Filtering happens per event, not here.
    pub fn register(self: &Arc<Self>, source: &mut dyn EventSource) {
        for event in EVENT_CATALOG {
            source.subscribe(event, Arc::clone(self) as Arc<dyn EventHandler>);
        }
    }

    pub async fn route<T>(&self, event: &str, payload: &T)
    where
        T: Serialize + ?Sized + Sync,
    {
        debug!(event, "got event");
        if !self.enabled.contains(event) {
            return;
        }

        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(event, error = %e, "could not serialize event payload, dropping it");
                return;
            }
        };

        let message = OutboundMessage::new(
            routing_key(&self.routing_prefix, event),
            body,
            self.publish_delay_ms,
        );
        self.publisher.publish(message).await;
    }
}

#[async_trait]
impl EventHandler for EventRouter {
    async fn on_event(&self, event: &str, payload: &Value) {
        trace!(event, %payload, "event payload");
        self.route(event, payload).await;
    }
}
