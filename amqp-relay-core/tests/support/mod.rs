#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use amqp_relay_core::{
    Broker, BrokerChannel, BrokerConnection, ChannelErrorCallback, ConnectionConfig,
    OutboundMessage, Publisher, RelayError,
};
use async_trait::async_trait;
use tokio::sync::Notify;

/// How many times each step fails before it starts succeeding.
#[derive(Debug, Default, Clone)]
pub struct Script {
    pub connect_failures: usize,
    pub channel_failures: usize,
    pub assert_failures: usize,
    pub check_failures: usize,
    pub faults_during_declare: usize,
    pub stalled_publishes: usize,
}

#[derive(Default)]
struct BrokerState {
    script: Script,
    connects: usize,
    channels: Vec<Arc<FakeChannel>>,
    held_connect: Option<Arc<Notify>>,
}

#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(script: Script) -> Self {
        let broker = Self::default();
        broker.state.lock().unwrap().script = script;
        broker
    }

    /// The next connect call waits until the returned gate is notified.
    pub fn hold_next_connect(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().unwrap().held_connect = Some(Arc::clone(&gate));
        gate
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn channels(&self) -> Vec<Arc<FakeChannel>> {
        self.state.lock().unwrap().channels.clone()
    }

    pub fn last_channel(&self) -> Arc<FakeChannel> {
        self.channels().last().cloned().expect("no channel opened yet")
    }

    pub fn published(&self) -> Vec<(String, OutboundMessage)> {
        self.channels()
            .iter()
            .flat_map(|ch| ch.published())
            .collect()
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn connect(
        &self,
        _config: &ConnectionConfig,
    ) -> Result<Box<dyn BrokerConnection>, RelayError> {
        let gate = {
            let mut state = self.state.lock().unwrap();
            state.connects += 1;
            state.held_connect.take()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        if take(&mut state.script.connect_failures) {
            return Err(RelayError::Transport("ECONNREFUSED".into()));
        }
        Ok(Box::new(FakeConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeConnection {
    state: Arc<Mutex<BrokerState>>,
}

#[async_trait]
impl BrokerConnection for FakeConnection {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, RelayError> {
        let mut state = self.state.lock().unwrap();
        if take(&mut state.script.channel_failures) {
            return Err(RelayError::Transport("channel_max reached".into()));
        }
        let channel = Arc::new(FakeChannel {
            fail_assert: take(&mut state.script.assert_failures),
            fail_check: take(&mut state.script.check_failures),
            fault_on_assert: take(&mut state.script.faults_during_declare),
            stall_publish: take(&mut state.script.stalled_publishes),
            ..FakeChannel::default()
        });
        state.channels.push(Arc::clone(&channel));
        Ok(channel)
    }
}

fn take(remaining: &mut usize) -> bool {
    if *remaining > 0 {
        *remaining -= 1;
        true
    } else {
        false
    }
}

#[derive(Default)]
pub struct FakeChannel {
    fail_assert: bool,
    fail_check: bool,
    fault_on_assert: bool,
    stall_publish: bool,
    on_error: Mutex<Option<ChannelErrorCallback>>,
    declared: Mutex<Vec<(String, bool)>>,
    checked: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, OutboundMessage)>>,
    closed: AtomicBool,
}

impl FakeChannel {
    /// Simulates the broker closing the channel with a reply code.
    pub fn fail(&self, code: u16) {
        if let Some(callback) = self.on_error.lock().unwrap().as_ref() {
            callback(RelayError::Channel {
                code: Some(code),
                reason: "CHANNEL_ERROR".into(),
            });
        }
    }

    pub fn declared(&self) -> Vec<(String, bool)> {
        self.declared.lock().unwrap().clone()
    }

    pub fn checked(&self) -> Vec<String> {
        self.checked.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, OutboundMessage)> {
        self.published.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerChannel for FakeChannel {
    fn on_error(&self, callback: ChannelErrorCallback) {
        *self.on_error.lock().unwrap() = Some(callback);
    }

    async fn assert_exchange(&self, name: &str, durable: bool) -> Result<(), RelayError> {
        self.declared.lock().unwrap().push((name.to_string(), durable));
        if self.fault_on_assert {
            self.fail(406);
        }
        if self.fail_assert {
            return Err(RelayError::Declaration {
                exchange: name.to_string(),
                reason: "PRECONDITION_FAILED".into(),
            });
        }
        Ok(())
    }

    async fn check_exchange(&self, name: &str) -> Result<(), RelayError> {
        self.checked.lock().unwrap().push(name.to_string());
        if self.fail_check {
            return Err(RelayError::Declaration {
                exchange: name.to_string(),
                reason: "NOT_FOUND".into(),
            });
        }
        Ok(())
    }

    async fn publish(&self, exchange: &str, message: &OutboundMessage) -> Result<(), RelayError> {
        if self.stall_publish {
            // a flow-controlled broker that never drains the socket
            std::future::pending::<()>().await;
        }
        self.published
            .lock()
            .unwrap()
            .push((exchange.to_string(), message.clone()));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Records every message instead of talking to a broker.
#[derive(Default)]
pub struct SpyPublisher {
    messages: Mutex<Vec<OutboundMessage>>,
}

impl SpyPublisher {
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for SpyPublisher {
    async fn publish(&self, message: OutboundMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

pub fn config(host: &str, exchange: &str) -> ConnectionConfig {
    ConnectionConfig::new(host, exchange)
}

pub const RETRY: Duration = Duration::from_secs(10);

/// Lets spawned attempts run to completion without reaching the next retry tick.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
