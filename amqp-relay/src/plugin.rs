use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use amqp_relay_core::{
    Broker, EventHandler, EventRouter, EventSource, ExchangeConnection, RelayConfig, RelayOptions,
};
use serde_json::{json, Value};
use tokio::io::AsyncWrite;
use tracing::{debug, error, info, warn};

use crate::manifest::manifest;
use crate::rpc::{RpcMessage, RpcWriter, METHOD_NOT_FOUND};

/// Notification handlers keyed by event name.
#[derive(Default)]
pub struct Subscriptions {
    handlers: HashMap<&'static str, Arc<dyn EventHandler>>,
}

impl Subscriptions {
    pub fn get(&self, event: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(event)
    }
}

impl EventSource for Subscriptions {
    fn subscribe(&mut self, event: &'static str, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(event, handler);
    }
}

/// Host-facing side of the relay: answers the plugin handshake and feeds
/// notifications to the router.
pub struct RelayPlugin<W> {
    writer: RpcWriter<W>,
    broker: Arc<dyn Broker>,
    subscriptions: Subscriptions,
    connection: Option<ExchangeConnection>,
    initialized: bool,
}

impl<W> RelayPlugin<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: RpcWriter<W>, broker: Arc<dyn Broker>) -> Self {
        Self {
            writer,
            broker,
            subscriptions: Subscriptions::default(),
            connection: None,
            initialized: false,
        }
    }

    /// True once the broker channel is up and events are being forwarded.
    pub fn is_relaying(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(ExchangeConnection::is_healthy)
    }

    /// Only write failures on stdout are returned; the host is gone at that point.
    pub async fn handle(&mut self, message: RpcMessage) -> io::Result<()> {
        let RpcMessage { id, method, params } = message;
        match id {
            Some(id) => match method.as_str() {
                "getmanifest" => self.writer.respond(id, manifest()).await,
                "init" => {
                    self.init(&params);
                    self.writer.respond(id, json!({})).await
                }
                other => {
                    warn!(method = other, "unsupported request from host");
                    self.writer
                        .error(id, METHOD_NOT_FOUND, &format!("unknown method '{other}'"))
                        .await
                }
            },
            None => {
                self.dispatch(&method, &params).await;
                Ok(())
            }
        }
    }

    fn init(&mut self, params: &Value) {
        if self.initialized {
            warn!("duplicate init from host ignored");
            return;
        }
        self.initialized = true;

        let raw = params.get("options").cloned().unwrap_or_else(|| json!({}));
        let options: RelayOptions = match serde_json::from_value(raw) {
            Ok(options) => options,
            Err(e) => {
                error!(error = %e, "invalid AMQP relay options, relay disabled");
                return;
            }
        };
        let config = match RelayConfig::from_options(&options) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "invalid AMQP relay options, relay disabled");
                return;
            }
        };
        config.log_settings();

        let Some(conn_config) = config.connection_config() else {
            info!("AMQP plugin is installed but not enabled");
            return;
        };

        let connection = ExchangeConnection::new(conn_config.clone(), Arc::clone(&self.broker));
        let router = Arc::new(EventRouter::new(
            &conn_config,
            config.enabled.clone(),
            Arc::new(connection.clone()),
        ));
        router.register(&mut self.subscriptions);
        connection.start();
        self.connection = Some(connection);
    }

    async fn dispatch(&self, event: &str, params: &Value) {
        match self.subscriptions.get(event) {
            Some(handler) => handler.on_event(event, params).await,
            None => debug!(event, "notification without a handler"),
        }
    }
}
