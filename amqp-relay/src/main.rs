// AMQP relay plugin for lightningd.
// Run: lightningd --plugin=/path/to/amqp-relay --amqp-host=localhost:5672 ...

mod logging;
mod manifest;
mod plugin;
mod rpc;

use std::sync::Arc;

use amqp_relay_rabbitmq::LapinBroker;
use tracing::info;

use crate::plugin::RelayPlugin;
use crate::rpc::{spawn_reader, RpcWriter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    info!(version = env!("CARGO_PKG_VERSION"), "starting AMQP relay plugin");

    let mut incoming = spawn_reader(std::io::stdin());
    let mut plugin = RelayPlugin::new(
        RpcWriter::new(tokio::io::stdout()),
        Arc::new(LapinBroker::new()),
    );

    while let Some(message) = incoming.recv().await {
        plugin.handle(message).await?;
    }

    info!(relaying = plugin.is_relaying(), "host closed stdin, exiting");
    Ok(())
}
