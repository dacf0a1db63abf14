mod lapin_broker;
mod options;

pub use lapin_broker::LapinBroker;
pub use options::{amqp_uri, connection_properties};
