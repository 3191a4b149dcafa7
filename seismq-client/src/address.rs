//! Broker URI parsing.

use core::fmt;
use std::str::FromStr;

use url::{Host, Url};

use crate::{error::SetupError, options::Credentials};

pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_TLS_PORT: u16 = 8883;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// `mqtt://` or `tcp://`
    Mqtt,
    /// `mqtts://`, `ssl://` or `tls://`
    Mqtts,
}

impl Scheme {
    fn from_str(scheme: &str) -> Option<Scheme> {
        match scheme {
            "mqtt" | "tcp" => Some(Scheme::Mqtt),
            "mqtts" | "ssl" | "tls" => Some(Scheme::Mqtts),
            _ => None,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Mqtt => DEFAULT_PORT,
            Scheme::Mqtts => DEFAULT_TLS_PORT,
        }
    }
}

/// A validated broker endpoint.
///
/// The `Display` form never includes credentials, so it is safe to log.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    scheme: Scheme,
    host: String,
    port: u16,
    credentials: Option<Credentials>,
}

impl BrokerAddress {
    pub fn parse(address: &str) -> Result<Self, SetupError> {
        let malformed = |reason: String| SetupError::MalformedAddress {
            address: address.to_string(),
            reason,
        };

        if address.trim().is_empty() {
            return Err(malformed("address is empty".into()));
        }

        let url = Url::parse(address).map_err(|e| malformed(e.to_string()))?;

        let scheme = Scheme::from_str(url.scheme())
            .ok_or_else(|| SetupError::UnsupportedScheme(url.scheme().to_string()))?;

        let host = match url.host() {
            Some(Host::Domain(d)) if !d.is_empty() => d.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            _ => return Err(SetupError::MissingHost(address.to_string())),
        };

        let credentials = if url.username().is_empty() {
            None
        } else {
            let decode = |s: &str| {
                urlencoding::decode(s)
                    .map(|c| c.into_owned())
                    .map_err(|e| malformed(e.to_string()))
            };

            Some(Credentials {
                username: decode(url.username())?,
                password: url.password().map(decode).transpose()?,
            })
        };

        Ok(BrokerAddress {
            scheme,
            port: url.port().unwrap_or_else(|| scheme.default_port()),
            host,
            credentials,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn is_tls(&self) -> bool {
        self.scheme == Scheme::Mqtts
    }

    /// Host name or IP literal, without IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Credentials embedded in the URI user info, if any.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

impl FromStr for BrokerAddress {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BrokerAddress::parse(s)
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Mqtt => "mqtt",
            Scheme::Mqtts => "mqtts",
        };

        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", scheme, self.host, self.port)
        }
    }
}

impl fmt::Debug for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BrokerAddress")
            .field(&format_args!("{}", self))
            .finish()
    }
}
