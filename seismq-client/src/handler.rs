use core::fmt;

use bytes::Bytes;

use crate::{
    error::TransportError,
    event::{EventKind, LifecycleEvent},
};

type Callback = Box<dyn FnMut() + Send>;
type MessageCallback = Box<dyn FnMut(&str, &Bytes) + Send>;
type ErrorCallback = Box<dyn FnMut(&TransportError) + Send>;

/// One optional callback per lifecycle event.
///
/// Callbacks run on the relay task, one at a time and in event order. An
/// empty slot means the event is only logged.
///
/// ```
/// use seismq_client::Handlers;
///
/// let handlers = Handlers::new()
///     .on_connect(|| println!("connected"))
///     .on_message(|topic, payload| println!("{}: {} bytes", topic, payload.len()));
/// ```
#[derive(Default)]
pub struct Handlers {
    on_connect: Option<Callback>,
    on_message: Option<MessageCallback>,
    on_error: Option<ErrorCallback>,
    on_close: Option<Callback>,
    on_offline: Option<Callback>,
    on_reconnect: Option<Callback>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_connect = Some(Box::new(f));
        self
    }

    pub fn on_message(mut self, f: impl FnMut(&str, &Bytes) + Send + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&TransportError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_close(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    pub fn on_offline(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_offline = Some(Box::new(f));
        self
    }

    pub fn on_reconnect(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_reconnect = Some(Box::new(f));
        self
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Connected => self.on_connect.is_some(),
            EventKind::MessageReceived => self.on_message.is_some(),
            EventKind::Errored => self.on_error.is_some(),
            EventKind::Closed => self.on_close.is_some(),
            EventKind::Offline => self.on_offline.is_some(),
            EventKind::Reconnecting => self.on_reconnect.is_some(),
        }
    }

    /// Kinds with a callback, in declaration order.
    pub fn registered(&self) -> impl Iterator<Item = EventKind> + '_ {
        [
            EventKind::Connected,
            EventKind::MessageReceived,
            EventKind::Errored,
            EventKind::Closed,
            EventKind::Offline,
            EventKind::Reconnecting,
        ]
        .into_iter()
        .filter(|kind| self.is_registered(*kind))
    }

    /// Invokes the slot matching `event`. Returns false when it is empty.
    pub(crate) fn dispatch(&mut self, event: &LifecycleEvent) -> bool {
        match event {
            LifecycleEvent::Connected => call(&mut self.on_connect),
            LifecycleEvent::MessageReceived { topic, payload } => match &mut self.on_message {
                Some(f) => {
                    f(topic, payload);
                    true
                }
                None => false,
            },
            LifecycleEvent::Errored(err) => match &mut self.on_error {
                Some(f) => {
                    f(err);
                    true
                }
                None => false,
            },
            LifecycleEvent::Closed => call(&mut self.on_close),
            LifecycleEvent::Offline => call(&mut self.on_offline),
            LifecycleEvent::Reconnecting => call(&mut self.on_reconnect),
        }
    }
}

fn call(slot: &mut Option<Callback>) -> bool {
    match slot {
        Some(f) => {
            f();
            true
        }
        None => false,
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<String> = self.registered().map(|kind| kind.to_string()).collect();

        f.debug_struct("Handlers")
            .field("registered", &registered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[test]
    fn test_empty_handlers_never_fault() {
        let mut handlers = Handlers::new();

        for event in [
            LifecycleEvent::Connected,
            LifecycleEvent::Offline,
            LifecycleEvent::Errored(TransportError::KeepAliveTimeout),
            LifecycleEvent::Closed,
        ] {
            assert!(!handlers.dispatch(&event));
        }
    }

    #[test]
    fn test_dispatch_hits_only_matching_slot() {
        let connects = Arc::new(AtomicUsize::new(0));
        let counter = connects.clone();
        let mut handlers = Handlers::new().on_connect(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handlers.is_registered(EventKind::Connected));
        assert!(!handlers.is_registered(EventKind::Closed));

        assert!(handlers.dispatch(&LifecycleEvent::Connected));
        assert!(!handlers.dispatch(&LifecycleEvent::Reconnecting));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_message_slot_receives_topic_and_payload() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut handlers = Handlers::new().on_message(move |topic, payload| {
            let _ = tx.send((topic.to_string(), payload.clone()));
        });

        handlers.dispatch(&LifecycleEvent::MessageReceived {
            topic: "sensors/quake".into(),
            payload: Bytes::from_static(b"M5.2"),
        });

        assert_eq!(
            rx.try_recv().unwrap(),
            ("sensors/quake".to_string(), Bytes::from_static(b"M5.2"))
        );
        assert!(rx.try_recv().is_err());
    }
}
