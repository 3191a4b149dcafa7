//! Structured logging of lifecycle transitions.

use core::fmt;

use tracing::{debug, info, warn};

use crate::event::EventKind;

/// Fixed prefix on every supervisor log line, for grepping.
pub const LOG_PREFIX: &str = "[seismq-supervisor]";

/// An ordered key/value pair attached to a log record.
pub type Field = (&'static str, String);

/// Sink for lifecycle log records.
///
/// Every record carries at least `seq` (per-connection sequence number) and
/// `broker`; errors add `cause`, messages add `topic` and `bytes`.
pub trait EventLog: Send + Sync {
    /// Called once by `open`, before the transport starts.
    fn log_open(&self, fields: &[Field]);

    fn log_event(&self, kind: EventKind, fields: &[Field]);
}

/// Default sink, writing through `tracing` under the `seismq::supervisor`
/// target. Timestamps come from the installed subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl EventLog for TracingLog {
    fn log_open(&self, fields: &[Field]) {
        info!(target: "seismq::supervisor", "{} opening connection {}", LOG_PREFIX, Fields(fields));
    }

    fn log_event(&self, kind: EventKind, fields: &[Field]) {
        let fields = Fields(fields);

        match kind {
            EventKind::Errored => {
                warn!(target: "seismq::supervisor", event = %kind, "{} {} {}", LOG_PREFIX, kind, fields)
            }
            EventKind::MessageReceived => {
                debug!(target: "seismq::supervisor", event = %kind, "{} {} {}", LOG_PREFIX, kind, fields)
            }
            _ => info!(target: "seismq::supervisor", event = %kind, "{} {} {}", LOG_PREFIX, kind, fields),
        }
    }
}

/// Renders fields as `key=value` pairs, quoting values with spaces.
pub struct Fields<'a>(pub &'a [Field]);

impl fmt::Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }

            if value.contains(char::is_whitespace) {
                write!(f, "{}={:?}", key, value)?;
            } else {
                write!(f, "{}={}", key, value)?;
            }
        }

        Ok(())
    }
}
