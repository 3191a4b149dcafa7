//! Supervised MQTT connections.
//!
//! `open` connects to a broker in the background, keeps the session alive
//! and reports every lifecycle transition to optional handlers, logging each
//! one under the `seismq::supervisor` target.
//!
//! # Example
//!
//! ```no_run
//! use seismq_client::{ConnectOptions, Handlers, QoS};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handlers = Handlers::new()
//!         .on_connect(|| println!("connected"))
//!         .on_message(|topic, payload| println!("{}: {:?}", topic, payload))
//!         .on_error(|e| eprintln!("transport error: {}", e));
//!
//!     let connection = seismq_client::open(
//!         "mqtt://localhost:1883",
//!         ConnectOptions::new().client_id("quake-watch"),
//!         handlers,
//!     )?;
//!
//!     connection.subscribe(&[("sensors/+/quake", QoS::AtLeastOnce)]).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     connection.close().await;
//!
//!     Ok(())
//! }
//! ```

mod address;
mod connection;
mod error;
mod event;
mod handler;
mod log;
mod mqtt;
mod options;
mod supervisor;
mod tls;
mod transport;

pub use address::{BrokerAddress, Scheme};
pub use error::{ClientError, Result, SetupError, TransportError};
pub use event::{ConnectionState, EventKind, LifecycleEvent};
pub use handler::Handlers;
pub use log::{EventLog, Field, Fields, TracingLog, LOG_PREFIX};
pub use mqtt::MqttTransport;
pub use options::{ConnectOptions, Credentials, TransportOptions};
pub use supervisor::{Connection, Supervisor};
pub use transport::{Command, EventSender, Transport};

pub use seismq_core::protocol::ProtocolVersion;
pub use seismq_core::qos::QoS;

/// Parses `address`, validates `options` and starts the MQTT transport.
///
/// Must be called within a Tokio runtime.
pub fn open(
    address: &str,
    options: ConnectOptions,
    handlers: Handlers,
) -> std::result::Result<Connection, SetupError> {
    Supervisor::new(address, options)?.handlers(handlers).open()
}
