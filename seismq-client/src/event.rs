use core::fmt;

use bytes::Bytes;

use crate::error::TransportError;

/// Connection lifecycle notification relayed to the application.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// The broker accepted the handshake.
    Connected,

    /// A publication arrived on a subscribed topic.
    MessageReceived { topic: String, payload: Bytes },

    /// Non-fatal transport failure; the connection may still recover.
    Errored(TransportError),

    /// Terminal. Nothing is relayed after it.
    Closed,

    /// An established connection was lost.
    Offline,

    /// A reconnection attempt is starting.
    Reconnecting,
}

impl LifecycleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LifecycleEvent::Connected => EventKind::Connected,
            LifecycleEvent::MessageReceived { .. } => EventKind::MessageReceived,
            LifecycleEvent::Errored(_) => EventKind::Errored,
            LifecycleEvent::Closed => EventKind::Closed,
            LifecycleEvent::Offline => EventKind::Offline,
            LifecycleEvent::Reconnecting => EventKind::Reconnecting,
        }
    }
}

/// Payload-free tag of a [`LifecycleEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    MessageReceived,
    Errored,
    Closed,
    Offline,
    Reconnecting,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Connected => "connect",
            EventKind::MessageReceived => "message",
            EventKind::Errored => "error",
            EventKind::Closed => "close",
            EventKind::Offline => "offline",
            EventKind::Reconnecting => "reconnect",
        };
        f.write_str(name)
    }
}

/// Current state of a supervised connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Offline,
    Closed,
    Errored,
}

impl ConnectionState {
    /// State after relaying `event`. Messages do not change the state and
    /// `Closed` absorbs everything.
    pub fn after(self, event: &LifecycleEvent) -> ConnectionState {
        if self == ConnectionState::Closed {
            return self;
        }

        match event {
            LifecycleEvent::Connected => ConnectionState::Connected,
            LifecycleEvent::MessageReceived { .. } => self,
            LifecycleEvent::Errored(_) => ConnectionState::Errored,
            LifecycleEvent::Closed => ConnectionState::Closed,
            LifecycleEvent::Offline => ConnectionState::Offline,
            LifecycleEvent::Reconnecting => ConnectionState::Reconnecting,
        }
    }
}
