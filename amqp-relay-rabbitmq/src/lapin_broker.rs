use std::sync::Arc;

use amqp_relay_core::{
    Broker, BrokerChannel, BrokerConnection, ChannelErrorCallback, ConnectionConfig,
    OutboundMessage, RelayError, DELAY_HEADER,
};
use async_trait::async_trait;
use lapin::{
    options::*,
    types::{AMQPValue, FieldTable, LongLongInt},
    BasicProperties, Channel, Connection, ExchangeKind,
};
use tracing::{debug, info};

use crate::options::{amqp_uri, connection_properties};

const REPLY_SUCCESS: u16 = 200;

/// [`Broker`] backed by a lapin AMQP 0-9-1 client.
#[derive(Debug, Default, Clone)]
pub struct LapinBroker;

impl LapinBroker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Broker for LapinBroker {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn BrokerConnection>, RelayError> {
        let conn = Connection::connect_uri(amqp_uri(config), connection_properties())
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        info!(host = %config.host, port = config.port, "AMQP transport connected");
        Ok(Box::new(LapinConnection {
            conn: Arc::new(conn),
        }))
    }
}

struct LapinConnection {
    conn: Arc<Connection>,
}

#[async_trait]
impl BrokerConnection for LapinConnection {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, RelayError> {
        match self.conn.create_channel().await {
            Ok(channel) => Ok(Arc::new(LapinChannel {
                conn: Arc::clone(&self.conn),
                channel,
            })),
            Err(e) => {
                close_connection(&self.conn).await;
                Err(RelayError::Transport(e.to_string()))
            }
        }
    }
}

struct LapinChannel {
    conn: Arc<Connection>,
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for LapinChannel {
    fn on_error(&self, callback: ChannelErrorCallback) {
        // A dead connection takes its channels with it, so both report here.
        let callback: Arc<dyn Fn(RelayError) + Send + Sync> = Arc::from(callback);
        let on_channel = Arc::clone(&callback);
        self.channel
            .on_error(move |err| (*on_channel)(channel_fault(err)));
        self.conn.on_error(move |err| (*callback)(channel_fault(err)));
    }

    async fn assert_exchange(&self, name: &str, durable: bool) -> Result<(), RelayError> {
        self.channel
            .exchange_declare(
                name,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable,
                    auto_delete: false,
                    internal: false,
                    nowait: false,
                    passive: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| declaration_error(name, e))
    }

    async fn check_exchange(&self, name: &str) -> Result<(), RelayError> {
        self.channel
            .exchange_declare(
                name,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    passive: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| declaration_error(name, e))
    }

    async fn publish(&self, exchange: &str, message: &OutboundMessage) -> Result<(), RelayError> {
        // The returned confirm is dropped: confirms are never enabled on this channel.
        self.channel
            .basic_publish(
                exchange,
                &message.routing_key,
                BasicPublishOptions {
                    mandatory: false,
                    immediate: false,
                },
                &message.body,
                message_properties(message),
            )
            .await
            .map_err(|e| RelayError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self
            .channel
            .close(REPLY_SUCCESS, "relay channel discarded")
            .await
        {
            debug!(error = %e, "AMQP channel close failed");
        }
        close_connection(&self.conn).await;
    }
}

async fn close_connection(conn: &Connection) {
    if let Err(e) = conn.close(REPLY_SUCCESS, "relay connection discarded").await {
        debug!(error = %e, "AMQP connection close failed");
    }
}

fn message_properties(message: &OutboundMessage) -> BasicProperties {
    let properties = BasicProperties::default().with_content_type("application/json".into());
    match message.delay_header_ms {
        Some(delay) => {
            let mut headers = FieldTable::default();
            headers.insert(
                DELAY_HEADER.into(),
                AMQPValue::LongLongInt(LongLongInt::try_from(delay).unwrap_or(LongLongInt::MAX)),
            );
            properties.with_headers(headers)
        }
        None => properties,
    }
}

fn channel_fault(err: lapin::Error) -> RelayError {
    let code = match &err {
        lapin::Error::ProtocolError(amqp) => Some(amqp.get_id()),
        _ => None,
    };
    RelayError::Channel {
        code,
        reason: err.to_string(),
    }
}

fn declaration_error(exchange: &str, err: lapin::Error) -> RelayError {
    RelayError::Declaration {
        exchange: exchange.to_string(),
        reason: err.to_string(),
    }
}
