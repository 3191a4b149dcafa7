//! The seam between the supervisor and the network.

use async_trait::async_trait;
use bytes::Bytes;
use seismq_core::qos::QoS;
use tokio::sync::mpsc;

use crate::event::LifecycleEvent;

/// Request forwarded from a `Connection` handle to its transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Subscribe(Vec<(String, QoS)>),
    Unsubscribe(Vec<String>),
    Publish {
        topic: String,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    },
    Close,
}

pub type EventSender = mpsc::UnboundedSender<LifecycleEvent>;

/// Drives one logical connection on behalf of the supervisor.
///
/// `run` owns the session until it receives `Command::Close`, the command
/// channel is closed, or it gives up reconnecting. Its last emitted event
/// must be `LifecycleEvent::Closed`; anything sent afterwards is dropped.
#[async_trait]
pub trait Transport: Send + Sized + 'static {
    async fn run(self, commands: mpsc::Receiver<Command>, events: EventSender);
}
