//! MQTT 3.1.1 transport with keep-alive and a fixed-period reconnect loop.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use rustls::pki_types::ServerName;
use seismq_core::{
    protocol::ProtocolVersion,
    qos::QoS,
    return_code::{ConnectReturnCode, SubscribeReturnCode},
};
use seismq_packets::{
    ack::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket},
    connect::ConnectPacket,
    empty::{DisconnectPacket, PingReqPacket},
    publish::PublishPacket,
    subscribe::{SubscribePacket, UnsubscribePacket},
    ControlPacket,
};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    time::{self, timeout, Instant, MissedTickBehavior},
};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::{
    address::BrokerAddress,
    connection::Connection,
    error::{SetupError, TransportError},
    event::LifecycleEvent,
    options::{ConnectOptions, Credentials},
    tls::{self, TlsSettings},
    transport::{Command, EventSender, Transport},
};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RECONNECT_PERIOD: Duration = Duration::from_millis(1000);

/// Pass-through keys this transport understands.
const KNOWN_OPTIONS: &[&str] = &[
    "connectTimeoutSeconds",
    "reconnectPeriodMs",
    "protocolVersion",
    "caPath",
    "rejectUnauthorized",
    "resubscribe",
];

/// Everything the transport needs, resolved and validated during `open`.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Option<Credentials>,
    pub keep_alive: u16,
    pub clean_session: bool,
    pub protocol_version: ProtocolVersion,
    pub connect_timeout: Duration,
    /// `None` disables reconnection.
    pub reconnect_period: Option<Duration>,
    pub resubscribe: bool,
    pub tls: Option<TlsSettings>,
}

impl Settings {
    pub fn resolve(address: &BrokerAddress, options: &ConnectOptions) -> Result<Self, SetupError> {
        let extra = options.transport_options();

        for key in extra.keys().filter(|k| !KNOWN_OPTIONS.contains(k)) {
            debug!("ignoring unrecognized transport option `{}`", key);
        }

        let connect_timeout = match extra.unsigned("connectTimeoutSeconds")? {
            None => DEFAULT_CONNECT_TIMEOUT,
            Some(0) => {
                return Err(SetupError::invalid_option(
                    "connectTimeoutSeconds",
                    "must be greater than zero",
                ))
            }
            Some(secs) => Duration::from_secs(secs),
        };

        let reconnect_period = match extra.unsigned("reconnectPeriodMs")? {
            None => Some(DEFAULT_RECONNECT_PERIOD),
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
        };

        let protocol_version = match extra.unsigned("protocolVersion")? {
            None => ProtocolVersion::default(),
            Some(level) => u8::try_from(level)
                .ok()
                .and_then(ProtocolVersion::from_level)
                .ok_or_else(|| {
                    SetupError::invalid_option("protocolVersion", "expected 3 (MQTT 3.1) or 4 (MQTT 3.1.1)")
                })?,
        };

        let tls = if address.is_tls() {
            Some(TlsSettings {
                ca_path: extra.string("caPath")?.map(str::to_string),
                reject_unauthorized: extra.boolean("rejectUnauthorized")?.unwrap_or(true),
            })
        } else {
            None
        };

        let client_id = match options.get_client_id() {
            Some(id) => id.to_string(),
            None => format!("seismq_{:08x}", rand::random::<u32>()),
        };

        Ok(Settings {
            host: address.host().to_string(),
            port: address.port(),
            client_id,
            credentials: options
                .get_credentials()
                .or_else(|| address.credentials())
                .cloned(),
            keep_alive: options.get_keep_alive(),
            clean_session: options.is_clean_session(),
            protocol_version,
            connect_timeout,
            reconnect_period,
            resubscribe: extra.boolean("resubscribe")?.unwrap_or(true),
            tls,
        })
    }

    fn connect_packet(&self) -> ConnectPacket {
        ConnectPacket {
            protocol_version: self.protocol_version,
            clean_session: self.clean_session,
            keep_alive: self.keep_alive,
            client_id: self.client_id.clone(),
            user_name: self.credentials.as_ref().map(|c| c.username.clone()),
            password: self
                .credentials
                .as_ref()
                .and_then(|c| c.password.clone())
                .map(Bytes::from),
        }
    }
}

/// The production transport: MQTT 3.1.1 over TCP or TLS.
pub struct MqttTransport {
    settings: Settings,
    tls: Option<(TlsConnector, ServerName<'static>)>,
}

impl MqttTransport {
    /// Validates every option without touching the network.
    pub fn new(address: &BrokerAddress, options: &ConnectOptions) -> Result<Self, SetupError> {
        let settings = Settings::resolve(address, options)?;

        let tls = match &settings.tls {
            Some(tls_settings) => Some(tls::build_connector(tls_settings, &settings.host)?),
            None => None,
        };

        Ok(MqttTransport { settings, tls })
    }

    pub fn client_id(&self) -> &str {
        &self.settings.client_id
    }

    /// Opens the socket, sends CONNECT and waits for an accepting CONNACK.
    async fn handshake(&self) -> Result<(Connection, bool), TransportError> {
        timeout(self.settings.connect_timeout, self.establish())
            .await
            .map_err(|_| TransportError::ConnectTimeout(self.settings.connect_timeout))?
    }

    async fn establish(&self) -> Result<(Connection, bool), TransportError> {
        let tcp = TcpStream::connect((self.settings.host.as_str(), self.settings.port)).await?;
        tcp.set_nodelay(true)?;

        let mut connection = match &self.tls {
            Some((connector, server_name)) => Connection::new(
                connector
                    .connect(server_name.clone(), tcp)
                    .await
                    .map_err(|e| TransportError::Tls(e.to_string()))?,
            ),
            None => Connection::new(tcp),
        };

        connection
            .write_packet(ControlPacket::Connect(self.settings.connect_packet()))
            .await?;

        match connection.read_packet().await? {
            Some(ControlPacket::ConnAck(ack)) if ack.code == ConnectReturnCode::Accepted => {
                Ok((connection, ack.session_present))
            }
            Some(ControlPacket::ConnAck(ack)) => Err(TransportError::Refused(ack.code)),
            Some(other) => Err(TransportError::Protocol(format!(
                "expected CONNACK, got {:?}",
                other
            ))),
            None => Err(TransportError::Protocol(
                "connection closed before CONNACK".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn run(self, mut commands: mpsc::Receiver<Command>, events: EventSender) {
        let mut session = Session::new(self.settings.resubscribe);
        let mut first_attempt = true;

        'supervise: loop {
            if !first_attempt {
                let Some(period) = self.settings.reconnect_period else {
                    debug!("reconnection disabled, giving up");
                    break;
                };

                let wait = time::sleep(period);
                tokio::pin!(wait);

                loop {
                    tokio::select! {
                        _ = &mut wait => break,
                        cmd = commands.recv() => {
                            if session.queue(cmd) == Flow::Close {
                                break 'supervise;
                            }
                        }
                    }
                }

                let _ = events.send(LifecycleEvent::Reconnecting);
            }
            first_attempt = false;

            info!(
                "Connecting to MQTT broker at {}:{} as {}",
                self.settings.host, self.settings.port, self.settings.client_id
            );

            let handshake = self.handshake();
            tokio::pin!(handshake);

            let outcome = loop {
                tokio::select! {
                    result = &mut handshake => break result,
                    cmd = commands.recv() => {
                        if session.queue(cmd) == Flow::Close {
                            break 'supervise;
                        }
                    }
                }
            };

            let (mut connection, session_present) = match outcome {
                Ok(established) => established,
                Err(e) => {
                    warn!("Connection attempt failed: {}", e);
                    let _ = events.send(LifecycleEvent::Errored(e));
                    continue;
                }
            };

            info!("Connected, session_present: {}", session_present);
            let _ = events.send(LifecycleEvent::Connected);

            let exit = session
                .serve(
                    &mut connection,
                    &mut commands,
                    &events,
                    self.settings.keep_alive,
                    session_present,
                )
                .await;

            match exit {
                Exit::Close => {
                    let _ = connection
                        .write_packet(ControlPacket::Disconnect(DisconnectPacket))
                        .await;
                    connection.shutdown().await;
                    break;
                }
                Exit::Lost(cause) => {
                    connection.shutdown().await;
                    if let Some(e) = cause {
                        warn!("Connection lost: {}", e);
                        let _ = events.send(LifecycleEvent::Errored(e));
                    } else {
                        info!("Connection closed by broker");
                    }
                    let _ = events.send(LifecycleEvent::Offline);
                }
            }
        }

        let _ = events.send(LifecycleEvent::Closed);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

enum Exit {
    Close,
    Lost(Option<TransportError>),
}

struct PendingPublish {
    topic: String,
    payload: Bytes,
    qos: QoS,
    retain: bool,
}

/// Client-side state that outlives individual network connections.
struct Session {
    resubscribe: bool,
    subscriptions: BTreeMap<String, QoS>,
    /// Filters requested while offline that the broker has not seen yet.
    unsent_subscriptions: BTreeSet<String>,
    unsent_unsubscriptions: Vec<String>,
    outbox: VecDeque<PendingPublish>,
    /// In-flight SUBSCRIBE packets, for matching SUBACK codes to filters.
    pending_subacks: HashMap<u16, Vec<String>>,
    /// Inbound QoS 2 messages held until PUBREL.
    incoming: HashMap<u16, (String, Bytes)>,
    next_packet_id: u16,
}

impl Session {
    fn new(resubscribe: bool) -> Self {
        Session {
            resubscribe,
            subscriptions: BTreeMap::new(),
            unsent_subscriptions: BTreeSet::new(),
            unsent_unsubscriptions: Vec::new(),
            outbox: VecDeque::new(),
            pending_subacks: HashMap::new(),
            incoming: HashMap::new(),
            next_packet_id: 0,
        }
    }

    fn packet_id(&mut self) -> u16 {
        // Packet identifiers are non-zero
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        self.next_packet_id
    }

    /// Records a command received while no connection is up.
    fn queue(&mut self, cmd: Option<Command>) -> Flow {
        match cmd {
            None | Some(Command::Close) => return Flow::Close,
            Some(Command::Subscribe(filters)) => {
                for (filter, qos) in filters {
                    self.unsent_unsubscriptions.retain(|f| f != &filter);
                    self.unsent_subscriptions.insert(filter.clone());
                    self.subscriptions.insert(filter, qos);
                }
            }
            Some(Command::Unsubscribe(filters)) => {
                for filter in filters {
                    self.subscriptions.remove(&filter);
                    if !self.unsent_subscriptions.remove(&filter) {
                        self.unsent_unsubscriptions.push(filter);
                    }
                }
            }
            Some(Command::Publish {
                topic,
                payload,
                qos,
                retain,
            }) => self.outbox.push_back(PendingPublish {
                topic,
                payload,
                qos,
                retain,
            }),
        }

        Flow::Continue
    }

    /// Sends what accumulated while offline.
    async fn restore(
        &mut self,
        connection: &mut Connection,
        session_present: bool,
    ) -> Result<(), TransportError> {
        // SUBACKs owed by the previous connection will never arrive
        self.pending_subacks.clear();
        if !session_present {
            // The broker forgot the QoS 2 exchanges it would have completed
            self.incoming.clear();
        }

        let filters: Vec<(String, QoS)> = if !session_present && self.resubscribe {
            self.subscriptions
                .iter()
                .map(|(f, q)| (f.clone(), *q))
                .collect()
        } else {
            self.unsent_subscriptions
                .iter()
                .filter_map(|f| self.subscriptions.get(f).map(|q| (f.clone(), *q)))
                .collect()
        };
        self.unsent_subscriptions.clear();

        let unsubscriptions = std::mem::take(&mut self.unsent_unsubscriptions);
        if session_present && !unsubscriptions.is_empty() {
            self.send_unsubscribe(connection, unsubscriptions).await?;
        }

        if !filters.is_empty() {
            self.send_subscribe(connection, filters).await?;
        }

        while let Some(publish) = self.outbox.pop_front() {
            self.send_publish(connection, publish).await?;
        }

        Ok(())
    }

    async fn send_subscribe(
        &mut self,
        connection: &mut Connection,
        filters: Vec<(String, QoS)>,
    ) -> Result<(), TransportError> {
        let packet_id = self.packet_id();
        debug!("Sending SUBSCRIBE {} for {:?}", packet_id, filters);

        self.pending_subacks
            .insert(packet_id, filters.iter().map(|(f, _)| f.clone()).collect());

        connection
            .write_packet(ControlPacket::Subscribe(SubscribePacket { packet_id, filters }))
            .await
    }

    async fn send_unsubscribe(
        &mut self,
        connection: &mut Connection,
        filters: Vec<String>,
    ) -> Result<(), TransportError> {
        let packet_id = self.packet_id();
        debug!("Sending UNSUBSCRIBE {} for {:?}", packet_id, filters);

        connection
            .write_packet(ControlPacket::Unsubscribe(UnsubscribePacket { packet_id, filters }))
            .await
    }

    async fn send_publish(
        &mut self,
        connection: &mut Connection,
        publish: PendingPublish,
    ) -> Result<(), TransportError> {
        let packet_id = match publish.qos {
            QoS::AtMostOnce => None,
            _ => Some(self.packet_id()),
        };

        connection
            .write_packet(ControlPacket::Publish(PublishPacket {
                dup: false,
                qos: publish.qos,
                retain: publish.retain,
                topic: publish.topic,
                packet_id,
                payload: publish.payload,
            }))
            .await
    }

    /// Runs one established connection until it is lost or closed.
    async fn serve(
        &mut self,
        connection: &mut Connection,
        commands: &mut mpsc::Receiver<Command>,
        events: &EventSender,
        keep_alive: u16,
        session_present: bool,
    ) -> Exit {
        if let Err(e) = self.restore(connection, session_present).await {
            return Exit::Lost(Some(e));
        }

        let period = Duration::from_secs(keep_alive.max(1) as u64);
        let mut ping_timer = time::interval_at(Instant::now() + period, period);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut awaiting_pingresp = false;

        loop {
            let result = tokio::select! {
                maybe_packet = connection.read_packet() => {
                    match maybe_packet {
                        Ok(Some(packet)) => {
                            self.handle_incoming(packet, connection, events, &mut awaiting_pingresp).await
                        }
                        Ok(None) => return Exit::Lost(None),
                        Err(e) => Err(e),
                    }
                }

                cmd = commands.recv() => {
                    match cmd {
                        None | Some(Command::Close) => return Exit::Close,
                        Some(cmd) => self.handle_command(cmd, connection).await,
                    }
                }

                _ = ping_timer.tick(), if keep_alive > 0 => {
                    if awaiting_pingresp {
                        Err(TransportError::KeepAliveTimeout)
                    } else {
                        debug!("Sending PINGREQ");
                        awaiting_pingresp = true;
                        connection.write_packet(ControlPacket::PingReq(PingReqPacket)).await
                    }
                }
            };

            if let Err(e) = result {
                return Exit::Lost(Some(e));
            }
        }
    }

    async fn handle_command(
        &mut self,
        cmd: Command,
        connection: &mut Connection,
    ) -> Result<(), TransportError> {
        match cmd {
            Command::Subscribe(filters) => {
                for (filter, qos) in &filters {
                    self.subscriptions.insert(filter.clone(), *qos);
                }
                self.send_subscribe(connection, filters).await
            }
            Command::Unsubscribe(filters) => {
                for filter in &filters {
                    self.subscriptions.remove(filter);
                }
                self.send_unsubscribe(connection, filters).await
            }
            Command::Publish {
                topic,
                payload,
                qos,
                retain,
            } => {
                self.send_publish(
                    connection,
                    PendingPublish {
                        topic,
                        payload,
                        qos,
                        retain,
                    },
                )
                .await
            }
            // Handled by the caller
            Command::Close => Ok(()),
        }
    }

    async fn handle_incoming(
        &mut self,
        packet: ControlPacket,
        connection: &mut Connection,
        events: &EventSender,
        awaiting_pingresp: &mut bool,
    ) -> Result<(), TransportError> {
        match packet {
            ControlPacket::Publish(publish) => {
                debug!("Received PUBLISH on topic: {}", publish.topic);

                match (publish.qos, publish.packet_id) {
                    (QoS::AtMostOnce, _) => {
                        let _ = events.send(LifecycleEvent::MessageReceived {
                            topic: publish.topic,
                            payload: publish.payload,
                        });
                    }
                    (QoS::AtLeastOnce, Some(packet_id)) => {
                        connection
                            .write_packet(ControlPacket::PubAck(PubAckPacket { packet_id }))
                            .await?;
                        let _ = events.send(LifecycleEvent::MessageReceived {
                            topic: publish.topic,
                            payload: publish.payload,
                        });
                    }
                    (QoS::ExactlyOnce, Some(packet_id)) => {
                        // A redelivery before PUBREL replaces the held copy
                        self.incoming
                            .insert(packet_id, (publish.topic, publish.payload));
                        connection
                            .write_packet(ControlPacket::PubRec(PubRecPacket { packet_id }))
                            .await?;
                    }
                    (_, None) => {
                        return Err(TransportError::Protocol(
                            "QoS > 0 PUBLISH without packet identifier".to_string(),
                        ))
                    }
                }
            }
            ControlPacket::PubRel(PubRelPacket { packet_id }) => {
                if let Some((topic, payload)) = self.incoming.remove(&packet_id) {
                    let _ = events.send(LifecycleEvent::MessageReceived { topic, payload });
                }
                connection
                    .write_packet(ControlPacket::PubComp(PubCompPacket { packet_id }))
                    .await?;
            }
            ControlPacket::PubRec(PubRecPacket { packet_id }) => {
                connection
                    .write_packet(ControlPacket::PubRel(PubRelPacket { packet_id }))
                    .await?;
            }
            ControlPacket::PubAck(ack) => {
                debug!("Received PUBACK for packet_id: {}", ack.packet_id);
            }
            ControlPacket::PubComp(comp) => {
                debug!("Received PUBCOMP for packet_id: {}", comp.packet_id);
            }
            ControlPacket::SubAck(suback) => {
                let filters = self
                    .pending_subacks
                    .remove(&suback.packet_id)
                    .unwrap_or_default();

                for (filter, code) in filters.into_iter().zip(suback.return_codes) {
                    match code {
                        SubscribeReturnCode::Granted(qos) => {
                            debug!("Subscribed to {} with QoS {}", filter, qos);
                        }
                        SubscribeReturnCode::Failure => {
                            self.subscriptions.remove(&filter);
                            let _ = events.send(LifecycleEvent::Errored(
                                TransportError::SubscriptionRejected(filter),
                            ));
                        }
                    }
                }
            }
            ControlPacket::UnsubAck(ack) => {
                debug!("Received UNSUBACK for packet_id: {}", ack.packet_id);
            }
            ControlPacket::PingResp(_) => {
                debug!("Received PINGRESP");
                *awaiting_pingresp = false;
            }
            other => {
                return Err(TransportError::Protocol(format!(
                    "unexpected packet from broker: {:?}",
                    other
                )));
            }
        }

        Ok(())
    }
}
