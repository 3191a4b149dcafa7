//! Owns a transport, relays its events to handlers and logs every transition.

use core::fmt;
use std::sync::Arc;

use bytes::Bytes;
use seismq_core::{qos::QoS, topic};
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tracing::debug;

use crate::{
    address::BrokerAddress,
    error::{ClientError, Result, SetupError},
    event::{ConnectionState, LifecycleEvent},
    handler::Handlers,
    log::{EventLog, Field, TracingLog},
    mqtt::MqttTransport,
    options::ConnectOptions,
    transport::{Command, Transport},
};

const COMMAND_CAPACITY: usize = 64;

/// Validated configuration for one supervised connection.
///
/// ```no_run
/// use seismq_client::{ConnectOptions, Handlers, Supervisor};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let connection = Supervisor::new("mqtt://localhost:1883", ConnectOptions::new())?
///     .handlers(Handlers::new().on_connect(|| println!("connected")))
///     .open()?;
///
/// connection.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Supervisor {
    address: BrokerAddress,
    options: ConnectOptions,
    handlers: Handlers,
    log: Arc<dyn EventLog>,
}

impl Supervisor {
    pub fn new(address: &str, options: ConnectOptions) -> std::result::Result<Self, SetupError> {
        Ok(Supervisor {
            address: BrokerAddress::parse(address)?,
            options,
            handlers: Handlers::default(),
            log: Arc::new(TracingLog),
        })
    }

    pub fn handlers(mut self, handlers: Handlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Replaces the default `tracing` sink.
    pub fn event_log(mut self, log: impl EventLog + 'static) -> Self {
        self.log = Arc::new(log);
        self
    }

    pub fn broker(&self) -> &BrokerAddress {
        &self.address
    }

    /// Starts the MQTT transport. Option errors surface here, before any
    /// network activity.
    pub fn open(self) -> std::result::Result<Connection, SetupError> {
        let transport = MqttTransport::new(&self.address, &self.options)?;
        Ok(self.open_with(transport))
    }

    /// Starts supervising `transport`. Must be called within a Tokio runtime.
    pub fn open_with<T: Transport>(self, transport: T) -> Connection {
        let broker = self.address.to_string();

        let registered: Vec<String> = self.handlers.registered().map(|k| k.to_string()).collect();
        self.log.log_open(&[
            ("broker", broker.clone()),
            ("keepAlive", self.options.get_keep_alive().to_string()),
            ("handlers", registered.join(",")),
        ]);

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(Status::default());

        tokio::spawn(transport.run(command_rx, event_tx));

        let relay = Relay {
            broker,
            handlers: self.handlers,
            log: self.log,
            state: state_tx,
            seq: 0,
        };
        let relay = tokio::spawn(relay.run(event_rx));

        Connection {
            inner: Arc::new(Inner {
                broker: self.address,
                commands: command_tx,
                state: state_rx,
                relay: Mutex::new(Some(relay)),
            }),
        }
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("address", &self.address)
            .field("handlers", &self.handlers)
            .finish()
    }
}

/// Moves events from the transport to the handlers, in order.
struct Relay {
    broker: String,
    handlers: Handlers,
    log: Arc<dyn EventLog>,
    state: watch::Sender<Status>,
    seq: u64,
}

impl Relay {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<LifecycleEvent>) {
        while let Some(event) = events.recv().await {
            let terminal = matches!(event, LifecycleEvent::Closed);
            self.relay(event);

            if terminal {
                return;
            }
        }

        // The transport ended without reporting it
        debug!("transport stopped without a close event");
        self.relay(LifecycleEvent::Closed);
    }

    fn relay(&mut self, event: LifecycleEvent) {
        self.seq += 1;

        let mut fields: Vec<Field> = vec![
            ("seq", self.seq.to_string()),
            ("broker", self.broker.clone()),
        ];
        match &event {
            LifecycleEvent::MessageReceived { topic, payload } => {
                fields.push(("topic", topic.clone()));
                fields.push(("bytes", payload.len().to_string()));
            }
            LifecycleEvent::Errored(cause) => fields.push(("cause", cause.to_string())),
            _ => {}
        }

        self.log.log_event(event.kind(), &fields);

        self.state.send_modify(|status| {
            if status.state != ConnectionState::Closed
                && matches!(event, LifecycleEvent::Connected)
            {
                status.handshakes += 1;
            }
            status.state = status.state.after(&event);
        });

        self.handlers.dispatch(&event);
    }
}

/// Published by the relay after every event.
#[derive(Debug, Clone, Copy)]
struct Status {
    state: ConnectionState,
    /// Successful handshakes so far. Later events may move `state` away
    /// from `Connected` before a waiter observes it.
    handshakes: u64,
}

impl Default for Status {
    fn default() -> Self {
        Status {
            state: ConnectionState::Connecting,
            handshakes: 0,
        }
    }
}

struct Inner {
    broker: BrokerAddress,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<Status>,
    relay: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a supervised connection.
///
/// Clones share the connection. Dropping the last handle closes it without
/// waiting for the `Closed` event.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    pub fn broker(&self) -> &BrokerAddress {
        &self.inner.broker
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().state
    }

    /// Waits for the first successful handshake.
    ///
    /// Returns immediately once any handshake has succeeded, even if the
    /// connection has since gone offline or reported an error. Fails with
    /// [`ClientError::Closed`] if the connection closes first.
    pub async fn connected(&self) -> Result<()> {
        let mut status = self.inner.state.clone();

        let handshakes = status
            .wait_for(|s| s.handshakes > 0 || s.state == ConnectionState::Closed)
            .await
            .map(|s| s.handshakes)
            .unwrap_or(0);

        match handshakes {
            0 => Err(ClientError::Closed),
            _ => Ok(()),
        }
    }

    /// Subscribes now if connected, otherwise on the next connect.
    pub async fn subscribe(&self, filters: &[(&str, QoS)]) -> Result<()> {
        self.ensure_open()?;

        for (filter, _) in filters {
            topic::validate_filter(filter).map_err(|source| ClientError::InvalidTopic {
                topic: filter.to_string(),
                source,
            })?;
        }

        if filters.is_empty() {
            return Ok(());
        }

        self.send(Command::Subscribe(
            filters.iter().map(|(f, q)| (f.to_string(), *q)).collect(),
        ))
        .await
    }

    pub async fn unsubscribe(&self, filters: &[&str]) -> Result<()> {
        self.ensure_open()?;

        for filter in filters {
            topic::validate_filter(filter).map_err(|source| ClientError::InvalidTopic {
                topic: filter.to_string(),
                source,
            })?;
        }

        if filters.is_empty() {
            return Ok(());
        }

        self.send(Command::Unsubscribe(
            filters.iter().map(|f| f.to_string()).collect(),
        ))
        .await
    }

    /// Publishes now if connected, otherwise queues until the next connect.
    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> Result<()> {
        self.ensure_open()?;

        topic::validate_name(topic).map_err(|source| ClientError::InvalidTopic {
            topic: topic.to_string(),
            source,
        })?;

        self.send(Command::Publish {
            topic: topic.to_string(),
            payload: payload.into(),
            qos,
            retain,
        })
        .await
    }

    /// Tears the connection down and waits until `Closed` has been relayed.
    ///
    /// Safe to call repeatedly and from several handles at once. No handler
    /// runs after the first call returns.
    pub async fn close(&self) {
        let mut relay = self.inner.relay.lock().await;

        let Some(handle) = relay.take() else {
            return;
        };

        // Fails only when the transport has already stopped
        let _ = self.inner.commands.send(Command::Close).await;

        if let Err(e) = handle.await {
            debug!("relay task ended abnormally: {}", e);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Closed => Err(ClientError::Closed),
            _ => Ok(()),
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.inner
            .commands
            .send(command)
            .await
            .map_err(|_| ClientError::Closed)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("broker", &self.inner.broker)
            .field("state", &self.state())
            .finish()
    }
}
