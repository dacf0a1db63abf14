pub mod broker;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;
pub mod publisher;
pub mod router;

pub use broker::{Broker, BrokerChannel, BrokerConnection, ChannelErrorCallback};
pub use catalog::{is_catalog_event, EVENT_CATALOG};
pub use config::{ConnectionConfig, EnabledEventSet, RelayConfig, RelayOptions};
pub use connection::{ConnectionPhase, ExchangeConnection, FORWARD_QUEUE_CAPACITY};
pub use error::RelayError;
pub use handler::{EventHandler, EventSource};
pub use message::{routing_key, OutboundMessage, DELAY_HEADER};
pub use publisher::Publisher;
pub use router::EventRouter;
