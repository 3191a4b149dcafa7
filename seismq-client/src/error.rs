use std::{io, sync::Arc, time::Duration};

use seismq_core::{return_code::ConnectReturnCode, topic::TopicError};
use thiserror::Error;

/// Input rejected by `open` before any network activity.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("malformed broker address `{address}`: {reason}")]
    MalformedAddress { address: String, reason: String },

    #[error("unsupported broker scheme `{0}` (expected mqtt, tcp, mqtts, ssl or tls)")]
    UnsupportedScheme(String),

    #[error("broker address `{0}` has no host")]
    MissingHost(String),

    #[error("invalid option `{key}`: {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("TLS setup failed: {0}")]
    Tls(String),
}

impl SetupError {
    pub(crate) fn invalid_option(key: &str, reason: impl Into<String>) -> Self {
        SetupError::InvalidOption {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Fault during an established or attempted session.
///
/// Never returned to a caller: it reaches the application through
/// `LifecycleEvent::Errored` and the connection may still recover.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("connection refused by broker: {0}")]
    Refused(ConnectReturnCode),

    #[error("invalid packet: {0}")]
    Decode(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("no PINGRESP within the keep-alive interval")]
    KeepAliveTimeout,

    #[error("broker rejected subscription to `{0}`")]
    SubscriptionRejected(String),

    #[error("TLS handshake failed: {0}")]
    Tls(String),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(Arc::new(err))
    }
}

impl From<seismq_core::error::Error> for TransportError {
    fn from(err: seismq_core::error::Error) -> Self {
        match err {
            seismq_core::error::Error::Io(e) => e.into(),
            other => TransportError::Decode(other.to_string()),
        }
    }
}

/// Errors returned by operations on a `Connection` handle.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection is closed")]
    Closed,

    #[error("invalid topic `{topic}`: {source}")]
    InvalidTopic {
        topic: String,
        #[source]
        source: TopicError,
    },
}

pub type Result<T> = std::result::Result<T, ClientError>;
