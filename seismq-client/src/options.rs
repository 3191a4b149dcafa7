use core::fmt;
use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::SetupError;

/// User name and password sent in CONNECT.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Options the supervisor does not interpret, handed to the transport as-is.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct TransportOptions(BTreeMap<String, toml::Value>);

impl TransportOptions {
    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<toml::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Non-negative integer option.
    pub fn unsigned(&self, key: &str) -> Result<Option<u64>, SetupError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(toml::Value::Integer(n)) if *n >= 0 => Ok(Some(*n as u64)),
            Some(other) => Err(SetupError::invalid_option(
                key,
                format!("expected a non-negative integer, got {}", other),
            )),
        }
    }

    pub fn boolean(&self, key: &str) -> Result<Option<bool>, SetupError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(toml::Value::Boolean(b)) => Ok(Some(*b)),
            Some(other) => Err(SetupError::invalid_option(
                key,
                format!("expected a boolean, got {}", other),
            )),
        }
    }

    pub fn string(&self, key: &str) -> Result<Option<&str>, SetupError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(toml::Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(SetupError::invalid_option(
                key,
                format!("expected a string, got {}", other),
            )),
        }
    }
}

/// Connection options.
///
/// Deserializes from a camelCase map: `credentials`, `keepAliveSeconds`,
/// `cleanSession` and `clientId` are recognized, every other key is kept in
/// [`TransportOptions`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    #[serde(default)]
    pub(crate) credentials: Option<Credentials>,

    #[serde(default = "default_keep_alive")]
    pub(crate) keep_alive_seconds: u16,

    #[serde(default = "default_clean_session")]
    pub(crate) clean_session: bool,

    #[serde(default)]
    pub(crate) client_id: Option<String>,

    #[serde(flatten)]
    pub(crate) transport: TransportOptions,
}

fn default_keep_alive() -> u16 {
    60
}

fn default_clean_session() -> bool {
    true
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            credentials: None,
            keep_alive_seconds: default_keep_alive(),
            clean_session: default_clean_session(),
            client_id: None,
            transport: TransportOptions::default(),
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a TOML table.
    pub fn from_toml(source: &str) -> Result<Self, SetupError> {
        toml::from_str(source).map_err(|e| SetupError::invalid_option("options", e.message()))
    }

    /// Set the user name and optional password.
    pub fn credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Set the keep-alive interval in seconds. Zero disables pings.
    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive_seconds = seconds;
        self
    }

    /// If true, the broker discards any previous session for this client id.
    pub fn clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    /// Set the client id. A random `seismq_` id is used otherwise.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set an option that is passed through to the transport.
    pub fn transport_option(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.transport.insert(key, value);
        self
    }

    pub fn get_credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn get_keep_alive(&self) -> u16 {
        self.keep_alive_seconds
    }

    pub fn is_clean_session(&self) -> bool {
        self.clean_session
    }

    pub fn get_client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn transport_options(&self) -> &TransportOptions {
        &self.transport
    }
}
