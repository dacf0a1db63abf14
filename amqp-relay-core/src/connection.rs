// amqp-relay-core/src/connection.rs
//! Broker channel lifecycle.
//!
//! `Disconnected -> Connecting -> Healthy`, back to `Disconnected` on a channel
//! error, with a fixed-interval retry timer re-running the connect attempt until a
//! channel has been opened and its exchange asserted and checked. Messages are only
//! forwarded while healthy; everything else is dropped on the floor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::broker::{Broker, BrokerChannel, ChannelErrorCallback};
use crate::{ConnectionConfig, OutboundMessage, Publisher, RelayError};

/// Messages waiting for a slow channel beyond this are dropped.
pub const FORWARD_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Healthy,
}

/// A healthy channel plus the task feeding it, in receipt order.
struct LiveChannel {
    attempt: u64,
    channel: Arc<dyn BrokerChannel>,
    outbox: mpsc::Sender<OutboundMessage>,
    forwarder: JoinHandle<()>,
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

#[derive(Default)]
struct RetryTimer {
    armed: bool,
    task: Option<JoinHandle<()>>,
}

impl RetryTimer {
    fn arm(&mut self, task: JoinHandle<()>) {
        self.armed = true;
        self.task = Some(task);
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.armed = false;
    }
}

struct ConnectionState {
    phase: ConnectionPhase,
    live: Option<LiveChannel>,
    retry: RetryTimer,
    started: bool,
    attempts: u64,
}

impl ConnectionState {
    fn is_healthy(&self) -> bool {
        self.phase == ConnectionPhase::Healthy && !self.retry.armed
    }
}

struct Shared {
    config: ConnectionConfig,
    broker: Arc<dyn Broker>,
    runtime: Handle,
    state: Mutex<ConnectionState>,
}

/// Handle to the relay's broker channel. Clones share the same state.
#[derive(Clone)]
pub struct ExchangeConnection {
    shared: Arc<Shared>,
}

impl ExchangeConnection {
    /// Captures the current tokio runtime; panics outside of one.
    pub fn new(config: ConnectionConfig, broker: Arc<dyn Broker>) -> Self {
        Self::with_runtime(config, broker, Handle::current())
    }

    /// Timers and attempts are spawned on `runtime`, including those triggered
    /// from broker callbacks running on foreign threads.
    pub fn with_runtime(config: ConnectionConfig, broker: Arc<dyn Broker>, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                broker,
                runtime,
                state: Mutex::new(ConnectionState {
                    phase: ConnectionPhase::Disconnected,
                    live: None,
                    retry: RetryTimer::default(),
                    started: false,
                    attempts: 0,
                }),
            }),
        }
    }

    /// Fires the first connect attempt and arms the retry timer. Later calls are no-ops.
    pub fn start(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.started {
                return;
            }
            state.started = true;
            state.phase = ConnectionPhase::Connecting;
            self.shared.arm_retry(&mut state);
        }
        self.shared.spawn_attempt();
    }

    pub fn is_healthy(&self) -> bool {
        self.shared.state.lock().is_healthy()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.shared.state.lock().phase
    }

    pub fn retry_armed(&self) -> bool {
        self.shared.state.lock().retry.armed
    }
}

#[async_trait]
impl Publisher for ExchangeConnection {
    /// Queues onto the live channel's forwarder and returns; never waits on the broker.
    async fn publish(&self, message: OutboundMessage) {
        let state = self.shared.state.lock();
        let live = match &state.live {
            Some(live) if state.is_healthy() => live,
            _ => {
                debug!(routing_key = %message.routing_key, "AMQP channel not healthy, dropping event");
                return;
            }
        };

        match live.outbox.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                warn!(routing_key = %message.routing_key, "AMQP channel backlog full, dropping event");
            }
            Err(TrySendError::Closed(message)) => {
                debug!(routing_key = %message.routing_key, "AMQP forwarder gone, dropping event");
            }
        }
    }
}

impl Shared {
    fn spawn_attempt(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        self.runtime.spawn(async move { shared.attempt().await });
    }

    /// The timer only holds a weak reference, so it winds down with the connection.
    fn arm_retry(self: &Arc<Self>, state: &mut ConnectionState) {
        let weak = Arc::downgrade(self);
        let period = self.config.retry_interval;
        let first_tick = Instant::now() + period;
        let task = self.runtime.spawn(async move {
            let mut ticker = interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(shared) => shared.spawn_attempt(),
                    None => break,
                }
            }
        });
        state.retry.arm(task);
    }

    async fn attempt(self: Arc<Self>) {
        let attempt = {
            let mut state = self.state.lock();
            if state.phase == ConnectionPhase::Disconnected {
                state.phase = ConnectionPhase::Connecting;
            }
            state.attempts += 1;
            state.attempts
        };
        let cfg = &self.config;
        info!(host = %cfg.host, port = cfg.port, attempt, "connecting to AMQP service");

        let connection = match self.broker.connect(cfg).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(host = %cfg.host, port = cfg.port, error = %e, "AMQP connection error");
                return;
            }
        };

        let channel = match connection.create_channel().await {
            Ok(ch) => ch,
            Err(e) => {
                warn!(host = %cfg.host, port = cfg.port, error = %e, "AMQP channel open error");
                return;
            }
        };

        let faulted = Arc::new(AtomicBool::new(false));
        channel.on_error(self.error_callback(attempt, Arc::clone(&faulted)));

        if let Err(e) = self.declare(channel.as_ref()).await {
            warn!(exchange = %cfg.exchange_name, error = %e, "discarding AMQP channel");
            channel.close().await;
            return;
        }

        self.promote(attempt, channel, &faulted);
    }

    async fn declare(&self, channel: &dyn BrokerChannel) -> Result<(), RelayError> {
        let exchange = &self.config.exchange_name;
        channel.assert_exchange(exchange, true).await?;
        info!(exchange = %exchange, "created exchange");
        channel.check_exchange(exchange).await
    }

    fn promote(self: &Arc<Self>, attempt: u64, channel: Arc<dyn BrokerChannel>, faulted: &AtomicBool) {
        let mut state = self.state.lock();
        // Checked under the lock so a fault cannot slip in between check and store.
        if faulted.load(Ordering::Acquire) {
            drop(state);
            warn!(attempt, "AMQP channel faulted while declaring, discarding");
            self.close_in_background(channel);
            return;
        }

        let (outbox, inbox) = mpsc::channel(FORWARD_QUEUE_CAPACITY);
        let forwarder = self.runtime.spawn(forward(
            Arc::clone(&channel),
            self.config.exchange_name.clone(),
            inbox,
        ));
        let superseded = state.live.replace(LiveChannel {
            attempt,
            channel,
            outbox,
            forwarder,
        });
        state.phase = ConnectionPhase::Healthy;
        state.retry.cancel();
        drop(state);

        info!(exchange = %self.config.exchange_name, attempt, "AMQP channel established");
        if let Some(old) = superseded {
            debug!(attempt = old.attempt, "closing superseded AMQP channel");
            self.close_in_background(Arc::clone(&old.channel));
        }
    }

    fn error_callback(self: &Arc<Self>, attempt: u64, faulted: Arc<AtomicBool>) -> ChannelErrorCallback {
        let weak = Arc::downgrade(self);
        Box::new(move |err| {
            if let Some(shared) = weak.upgrade() {
                shared.on_channel_error(attempt, &faulted, err);
            }
        })
    }

    fn on_channel_error(self: &Arc<Self>, attempt: u64, faulted: &AtomicBool, err: RelayError) {
        let mut state = self.state.lock();
        faulted.store(true, Ordering::Release);

        let is_live = state.live.as_ref().is_some_and(|live| live.attempt == attempt);
        if !is_live {
            debug!(attempt, error = %err, "ignoring error from an AMQP channel that is not live");
            return;
        }

        let dead = state.live.take();
        state.phase = ConnectionPhase::Disconnected;
        warn!(code = ?err.code(), error = %err, "AMQP channel error");
        if !state.retry.armed {
            self.arm_retry(&mut state);
        }
        drop(state);

        if let Some(dead) = dead {
            self.close_in_background(Arc::clone(&dead.channel));
        }
    }

    fn close_in_background(&self, channel: Arc<dyn BrokerChannel>) {
        self.runtime.spawn(async move { channel.close().await });
    }
}

async fn forward(
    channel: Arc<dyn BrokerChannel>,
    exchange: String,
    mut inbox: mpsc::Receiver<OutboundMessage>,
) {
    while let Some(message) = inbox.recv().await {
        debug!(routing_key = %message.routing_key, "publishing event");
        if let Err(e) = channel.publish(&exchange, &message).await {
            warn!(routing_key = %message.routing_key, error = %e, "AMQP publish failed");
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.state.get_mut().retry.cancel();
    }
}
