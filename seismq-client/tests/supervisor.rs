use std::time::Duration;

use bytes::{Bytes, BytesMut};
use seismq_client::{
    ClientError, ConnectOptions, ConnectionState, Handlers, QoS, SetupError, TransportError,
};
use seismq_core::{
    codec::Encoder,
    error::Error,
    return_code::{ConnectReturnCode, SubscribeReturnCode},
};
use seismq_packets::{
    ack::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket},
    connack::ConnAckPacket,
    connect::ConnectPacket,
    publish::PublishPacket,
    subscribe::SubAckPacket,
    ControlPacket,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::timeout,
};

const STEP: Duration = Duration::from_secs(5);

/// One client connection as seen by the scripted broker.
struct Peer {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Peer {
    async fn accept(listener: &TcpListener) -> Peer {
        let (stream, _) = timeout(STEP, listener.accept())
            .await
            .expect("client never connected")
            .unwrap();

        Peer {
            stream,
            buffer: BytesMut::new(),
        }
    }

    async fn read(&mut self) -> ControlPacket {
        timeout(STEP, async {
            loop {
                match ControlPacket::parse(&mut self.buffer) {
                    Ok(packet) => return packet,
                    Err(Error::PacketIncomplete) => {}
                    Err(e) => panic!("client sent a malformed packet: {}", e),
                }

                let n = self.stream.read_buf(&mut self.buffer).await.unwrap();
                assert!(n > 0, "client closed the connection");
            }
        })
        .await
        .expect("client sent nothing")
    }

    async fn write(&mut self, packet: ControlPacket) {
        let mut buffer = BytesMut::new();
        packet.encode(&mut buffer);
        self.stream.write_all(&buffer).await.unwrap();
    }

    async fn write_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    async fn handshake(&mut self, code: ConnectReturnCode, session_present: bool) -> ConnectPacket {
        let connect = match self.read().await {
            ControlPacket::Connect(connect) => connect,
            other => panic!("expected CONNECT, got {:?}", other),
        };

        self.write(ControlPacket::ConnAck(ConnAckPacket {
            session_present,
            code,
        }))
        .await;

        connect
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Connect,
    Message(String, Bytes),
    Error(String),
    Close,
    Offline,
    Reconnect,
}

fn recording() -> (Handlers, mpsc::UnboundedReceiver<Seen>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let on_connect = tx.clone();
    let on_message = tx.clone();
    let on_error = tx.clone();
    let on_close = tx.clone();
    let on_offline = tx.clone();
    let on_reconnect = tx;

    let handlers = Handlers::new()
        .on_connect(move || {
            let _ = on_connect.send(Seen::Connect);
        })
        .on_message(move |topic, payload| {
            let _ = on_message.send(Seen::Message(topic.to_string(), payload.clone()));
        })
        .on_error(move |e| {
            let _ = on_error.send(Seen::Error(describe(e)));
        })
        .on_close(move || {
            let _ = on_close.send(Seen::Close);
        })
        .on_offline(move || {
            let _ = on_offline.send(Seen::Offline);
        })
        .on_reconnect(move || {
            let _ = on_reconnect.send(Seen::Reconnect);
        });

    (handlers, rx)
}

fn describe(e: &TransportError) -> String {
    match e {
        TransportError::Refused(code) => format!("refused {}", code.code()),
        TransportError::ConnectTimeout(_) => "connect timeout".to_string(),
        TransportError::KeepAliveTimeout => "keep-alive timeout".to_string(),
        TransportError::SubscriptionRejected(filter) => format!("rejected {}", filter),
        other => other.to_string(),
    }
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    timeout(STEP, rx.recv())
        .await
        .expect("no lifecycle event")
        .expect("handlers dropped")
}

/// Everything still buffered once the relay has finished.
async fn drain(mut rx: mpsc::UnboundedReceiver<Seen>) -> Vec<Seen> {
    let mut rest = Vec::new();
    while let Some(seen) = timeout(STEP, rx.recv()).await.expect("relay still running") {
        rest.push(seen);
    }
    rest
}

async fn broker() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("mqtt://{}", listener.local_addr().unwrap());
    (listener, url)
}

fn options() -> ConnectOptions {
    ConnectOptions::new()
        .client_id("seismq-test")
        .keep_alive(0)
        .transport_option("reconnectPeriodMs", 0i64)
}

#[tokio::test]
async fn test_connect_subscribe_and_receive() {
    let (listener, url) = broker().await;
    let (handlers, mut seen) = recording();

    let connection = seismq_client::open(&url, options(), handlers).unwrap();

    let mut peer = Peer::accept(&listener).await;
    let connect = peer.handshake(ConnectReturnCode::Accepted, false).await;
    assert_eq!(connect.client_id, "seismq-test");
    assert_eq!(connect.keep_alive, 0);
    assert!(connect.clean_session);

    assert_eq!(next(&mut seen).await, Seen::Connect);
    connection.connected().await.unwrap();
    assert_eq!(connection.state(), ConnectionState::Connected);

    connection
        .subscribe(&[("sensors/quake", QoS::ExactlyOnce)])
        .await
        .unwrap();

    let subscribe = match peer.read().await {
        ControlPacket::Subscribe(subscribe) => subscribe,
        other => panic!("expected SUBSCRIBE, got {:?}", other),
    };
    assert_eq!(
        subscribe.filters,
        vec![("sensors/quake".to_string(), QoS::ExactlyOnce)]
    );
    peer.write(ControlPacket::SubAck(SubAckPacket {
        packet_id: subscribe.packet_id,
        return_codes: vec![SubscribeReturnCode::Granted(QoS::ExactlyOnce)],
    }))
    .await;

    peer.write(ControlPacket::Publish(PublishPacket {
        topic: "sensors/quake".into(),
        payload: Bytes::from_static(b"M5.2"),
        ..Default::default()
    }))
    .await;
    assert_eq!(
        next(&mut seen).await,
        Seen::Message("sensors/quake".into(), Bytes::from_static(b"M5.2"))
    );

    peer.write(ControlPacket::Publish(PublishPacket {
        qos: QoS::AtLeastOnce,
        topic: "sensors/quake".into(),
        packet_id: Some(7),
        payload: Bytes::from_static(b"M3.9"),
        ..Default::default()
    }))
    .await;
    assert_eq!(
        peer.read().await,
        ControlPacket::PubAck(PubAckPacket { packet_id: 7 })
    );
    assert_eq!(
        next(&mut seen).await,
        Seen::Message("sensors/quake".into(), Bytes::from_static(b"M3.9"))
    );

    // Exactly-once delivery waits for PUBREL
    peer.write(ControlPacket::Publish(PublishPacket {
        qos: QoS::ExactlyOnce,
        topic: "sensors/quake".into(),
        packet_id: Some(8),
        payload: Bytes::from_static(b"M6.0"),
        ..Default::default()
    }))
    .await;
    assert_eq!(
        peer.read().await,
        ControlPacket::PubRec(PubRecPacket { packet_id: 8 })
    );
    assert!(seen.try_recv().is_err());

    peer.write(ControlPacket::PubRel(PubRelPacket { packet_id: 8 }))
        .await;
    assert_eq!(
        peer.read().await,
        ControlPacket::PubComp(PubCompPacket { packet_id: 8 })
    );
    assert_eq!(
        next(&mut seen).await,
        Seen::Message("sensors/quake".into(), Bytes::from_static(b"M6.0"))
    );

    connection.close().await;
    assert!(matches!(peer.read().await, ControlPacket::Disconnect(_)));
    assert_eq!(drain(seen).await, vec![Seen::Close]);
}

#[tokio::test]
async fn test_reconnects_and_resubscribes_after_network_loss() {
    let (listener, url) = broker().await;
    let (handlers, mut seen) = recording();

    let options = options().transport_option("reconnectPeriodMs", 50i64);
    let connection = seismq_client::open(&url, options, handlers).unwrap();

    let mut first = Peer::accept(&listener).await;
    first.handshake(ConnectReturnCode::Accepted, false).await;
    assert_eq!(next(&mut seen).await, Seen::Connect);

    connection
        .subscribe(&[("sensors/#", QoS::AtLeastOnce)])
        .await
        .unwrap();
    let packet_id = match first.read().await {
        ControlPacket::Subscribe(subscribe) => subscribe.packet_id,
        other => panic!("expected SUBSCRIBE, got {:?}", other),
    };
    first
        .write(ControlPacket::SubAck(SubAckPacket {
            packet_id,
            return_codes: vec![SubscribeReturnCode::Granted(QoS::AtLeastOnce)],
        }))
        .await;

    drop(first);

    assert_eq!(next(&mut seen).await, Seen::Offline);
    assert_eq!(next(&mut seen).await, Seen::Reconnect);

    let mut second = Peer::accept(&listener).await;
    second.handshake(ConnectReturnCode::Accepted, false).await;
    assert_eq!(next(&mut seen).await, Seen::Connect);

    match second.read().await {
        ControlPacket::Subscribe(subscribe) => assert_eq!(
            subscribe.filters,
            vec![("sensors/#".to_string(), QoS::AtLeastOnce)]
        ),
        other => panic!("expected SUBSCRIBE, got {:?}", other),
    }

    assert!(seen.try_recv().is_err());
    assert_eq!(connection.state(), ConnectionState::Connected);

    connection.close().await;
    assert_eq!(drain(seen).await, vec![Seen::Close]);
}

#[tokio::test]
async fn test_refused_handshake_closes_without_reconnect() {
    let (listener, url) = broker().await;
    let (handlers, seen) = recording();

    let connection = seismq_client::open(&url, options(), handlers).unwrap();

    let mut peer = Peer::accept(&listener).await;
    peer.handshake(ConnectReturnCode::NotAuthorized, false).await;

    assert_eq!(
        drain(seen).await,
        vec![Seen::Error("refused 5".to_string()), Seen::Close]
    );
    assert_eq!(connection.state(), ConnectionState::Closed);
    assert!(matches!(
        connection.publish("sensors/quake", "M1.0", QoS::AtMostOnce, false).await,
        Err(ClientError::Closed)
    ));

    connection.close().await;
}

#[tokio::test]
async fn test_connect_timeout() {
    // Accepts at the TCP level but never answers CONNECT
    let (_listener, url) = broker().await;
    let (handlers, seen) = recording();

    let options = options().transport_option("connectTimeoutSeconds", 1i64);
    let connection = seismq_client::open(&url, options, handlers).unwrap();

    assert_eq!(
        drain(seen).await,
        vec![Seen::Error("connect timeout".to_string()), Seen::Close]
    );
    assert!(matches!(connection.connected().await, Err(ClientError::Closed)));
}

#[tokio::test]
async fn test_keep_alive_timeout() {
    let (listener, url) = broker().await;
    let (handlers, mut seen) = recording();

    let options = options().keep_alive(1);
    let _connection = seismq_client::open(&url, options, handlers).unwrap();

    let mut peer = Peer::accept(&listener).await;
    peer.handshake(ConnectReturnCode::Accepted, false).await;
    assert_eq!(next(&mut seen).await, Seen::Connect);

    // Swallow the PINGREQ without answering
    assert!(matches!(peer.read().await, ControlPacket::PingReq(_)));

    assert_eq!(
        drain(seen).await,
        vec![
            Seen::Error("keep-alive timeout".to_string()),
            Seen::Offline,
            Seen::Close
        ]
    );
}

#[tokio::test]
async fn test_rejected_subscription_reported() {
    let (listener, url) = broker().await;
    let (handlers, mut seen) = recording();

    let connection = seismq_client::open(&url, options(), handlers).unwrap();

    let mut peer = Peer::accept(&listener).await;
    peer.handshake(ConnectReturnCode::Accepted, false).await;
    assert_eq!(next(&mut seen).await, Seen::Connect);

    connection
        .subscribe(&[("private/#", QoS::AtMostOnce)])
        .await
        .unwrap();
    let packet_id = match peer.read().await {
        ControlPacket::Subscribe(subscribe) => subscribe.packet_id,
        other => panic!("expected SUBSCRIBE, got {:?}", other),
    };
    peer.write(ControlPacket::SubAck(SubAckPacket {
        packet_id,
        return_codes: vec![SubscribeReturnCode::Failure],
    }))
    .await;

    assert_eq!(next(&mut seen).await, Seen::Error("rejected private/#".to_string()));

    // The failure is not fatal
    assert_eq!(connection.state(), ConnectionState::Errored);
    connection.close().await;
    assert!(matches!(peer.read().await, ControlPacket::Disconnect(_)));
}

#[tokio::test]
async fn test_publish_queued_until_connected() {
    let (listener, url) = broker().await;
    let (handlers, _seen) = recording();

    let connection = seismq_client::open(&url, options(), handlers).unwrap();
    connection
        .publish("alerts/quake", "M7.1", QoS::AtMostOnce, true)
        .await
        .unwrap();

    let mut peer = Peer::accept(&listener).await;
    peer.handshake(ConnectReturnCode::Accepted, false).await;

    match peer.read().await {
        ControlPacket::Publish(publish) => {
            assert_eq!(publish.topic, "alerts/quake");
            assert_eq!(publish.payload, Bytes::from_static(b"M7.1"));
            assert!(publish.retain);
        }
        other => panic!("expected PUBLISH, got {:?}", other),
    }

    connection.close().await;
}

#[tokio::test]
async fn test_credentials_from_address() {
    let (listener, url) = broker().await;
    let url = url.replace("mqtt://", "mqtt://observer:s%40cret@");

    let connection = seismq_client::open(&url, options(), Handlers::new()).unwrap();
    assert_eq!(connection.broker().to_string(), url.replace("observer:s%40cret@", ""));

    let mut peer = Peer::accept(&listener).await;
    let connect = peer.handshake(ConnectReturnCode::Accepted, false).await;

    assert_eq!(connect.user_name.as_deref(), Some("observer"));
    assert_eq!(connect.password, Some(Bytes::from_static(b"s@cret")));

    connection.close().await;
}

#[tokio::test]
async fn test_close_twice_relays_one_close() {
    let (listener, url) = broker().await;
    let (handlers, mut seen) = recording();

    let connection = seismq_client::open(&url, options(), handlers).unwrap();

    let mut peer = Peer::accept(&listener).await;
    peer.handshake(ConnectReturnCode::Accepted, false).await;
    assert_eq!(next(&mut seen).await, Seen::Connect);

    let other = connection.clone();
    tokio::join!(connection.close(), other.close());
    connection.close().await;

    assert!(matches!(peer.read().await, ControlPacket::Disconnect(_)));
    assert_eq!(drain(seen).await, vec![Seen::Close]);
}

#[tokio::test]
async fn test_setup_errors_before_network() {
    for (address, options) in [
        ("not-a-uri", ConnectOptions::new()),
        ("ws://localhost:8080", ConnectOptions::new()),
        (
            "mqtt://localhost",
            ConnectOptions::new().transport_option("connectTimeoutSeconds", "soon"),
        ),
    ] {
        let result = seismq_client::open(address, options, Handlers::new());
        assert!(result.is_err(), "{} should fail", address);
    }

    assert!(matches!(
        seismq_client::open("not-a-uri", ConnectOptions::new(), Handlers::new()),
        Err(SetupError::MalformedAddress { .. })
    ));
    assert!(matches!(
        seismq_client::open("ws://localhost:8080", ConnectOptions::new(), Handlers::new()),
        Err(SetupError::UnsupportedScheme(_))
    ));
}

#[tokio::test]
async fn test_malformed_frame_drops_connection() {
    let (listener, url) = broker().await;
    let (handlers, mut seen) = recording();

    let _connection = seismq_client::open(&url, options(), handlers).unwrap();

    let mut peer = Peer::accept(&listener).await;
    peer.handshake(ConnectReturnCode::Accepted, false).await;
    assert_eq!(next(&mut seen).await, Seen::Connect);

    // Complete PUBLISH frame whose 5-byte topic does not fit its 3-byte body
    peer.write_raw(&[0x30, 0x03, 0x00, 0x05, b'a']).await;

    match next(&mut seen).await {
        Seen::Error(cause) => assert!(cause.starts_with("invalid packet"), "{}", cause),
        other => panic!("expected an error, got {:?}", other),
    }
    assert_eq!(drain(seen).await, vec![Seen::Offline, Seen::Close]);
}

#[tokio::test]
async fn test_resumed_session_sends_only_offline_changes() {
    let (listener, url) = broker().await;
    let (handlers, mut seen) = recording();

    let options = options().transport_option("reconnectPeriodMs", 50i64);
    let connection = seismq_client::open(&url, options, handlers).unwrap();

    let mut first = Peer::accept(&listener).await;
    first.handshake(ConnectReturnCode::Accepted, false).await;
    assert_eq!(next(&mut seen).await, Seen::Connect);

    connection
        .subscribe(&[("sensors/old", QoS::AtLeastOnce)])
        .await
        .unwrap();
    let packet_id = match first.read().await {
        ControlPacket::Subscribe(subscribe) => subscribe.packet_id,
        other => panic!("expected SUBSCRIBE, got {:?}", other),
    };
    first
        .write(ControlPacket::SubAck(SubAckPacket {
            packet_id,
            return_codes: vec![SubscribeReturnCode::Granted(QoS::AtLeastOnce)],
        }))
        .await;

    drop(first);
    assert_eq!(next(&mut seen).await, Seen::Offline);

    // Queued during the reconnect period
    connection
        .subscribe(&[("sensors/new", QoS::ExactlyOnce)])
        .await
        .unwrap();
    connection.unsubscribe(&["sensors/old"]).await.unwrap();
    assert_eq!(next(&mut seen).await, Seen::Reconnect);

    let mut second = Peer::accept(&listener).await;
    second.handshake(ConnectReturnCode::Accepted, true).await;
    assert_eq!(next(&mut seen).await, Seen::Connect);

    match second.read().await {
        ControlPacket::Unsubscribe(unsubscribe) => {
            assert_eq!(unsubscribe.filters, vec!["sensors/old".to_string()])
        }
        other => panic!("expected UNSUBSCRIBE, got {:?}", other),
    }
    match second.read().await {
        ControlPacket::Subscribe(subscribe) => assert_eq!(
            subscribe.filters,
            vec![("sensors/new".to_string(), QoS::ExactlyOnce)]
        ),
        other => panic!("expected SUBSCRIBE, got {:?}", other),
    }

    // Nothing else went out before the DISCONNECT
    connection.close().await;
    assert!(matches!(second.read().await, ControlPacket::Disconnect(_)));
}
