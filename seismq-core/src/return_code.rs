//! Return codes carried by CONNACK and SUBACK.

use core::fmt;

use crate::{error::Error, qos::QoS};

/// CONNACK return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectReturnCode {
    #[default]
    Accepted,
    UnacceptableProtocolVersion,
    IdentifierRejected,
    ServerUnavailable,
    BadUserNameOrPassword,
    NotAuthorized,
}

impl ConnectReturnCode {
    pub fn code(&self) -> u8 {
        use ConnectReturnCode::*;

        match self {
            Accepted => 0x00,
            UnacceptableProtocolVersion => 0x01,
            IdentifierRejected => 0x02,
            ServerUnavailable => 0x03,
            BadUserNameOrPassword => 0x04,
            NotAuthorized => 0x05,
        }
    }
}

impl TryFrom<u8> for ConnectReturnCode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        use ConnectReturnCode::*;

        Ok(match code {
            0x00 => Accepted,
            0x01 => UnacceptableProtocolVersion,
            0x02 => IdentifierRejected,
            0x03 => ServerUnavailable,
            0x04 => BadUserNameOrPassword,
            0x05 => NotAuthorized,
            _ => return Err(Error::MalformedPacket("unknown CONNACK return code")),
        })
    }
}

impl fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ConnectReturnCode::*;

        let msg = match self {
            Accepted => "Connection accepted",
            UnacceptableProtocolVersion => "Unacceptable protocol version",
            IdentifierRejected => "Identifier rejected",
            ServerUnavailable => "Server unavailable",
            BadUserNameOrPassword => "Bad user name or password",
            NotAuthorized => "Not authorized",
        };
        write!(f, "{}", msg)
    }
}

/// Per-filter SUBACK return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeReturnCode {
    Granted(QoS),
    Failure,
}

impl SubscribeReturnCode {
    pub fn code(&self) -> u8 {
        match self {
            SubscribeReturnCode::Granted(qos) => *qos as u8,
            SubscribeReturnCode::Failure => 0x80,
        }
    }
}

impl TryFrom<u8> for SubscribeReturnCode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x80 => Ok(SubscribeReturnCode::Failure),
            n => QoS::try_from(n)
                .map(SubscribeReturnCode::Granted)
                .map_err(|_| Error::MalformedPacket("unknown SUBACK return code")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_return_code_values() {
        for code in 0x00..=0x05u8 {
            assert_eq!(ConnectReturnCode::try_from(code).unwrap().code(), code);
        }
        assert!(ConnectReturnCode::try_from(0x06).is_err());
    }

    #[test]
    fn test_subscribe_return_code() {
        assert_eq!(
            SubscribeReturnCode::try_from(0x01).unwrap(),
            SubscribeReturnCode::Granted(QoS::AtLeastOnce)
        );
        assert_eq!(
            SubscribeReturnCode::try_from(0x80).unwrap(),
            SubscribeReturnCode::Failure
        );
        assert!(SubscribeReturnCode::try_from(0x03).is_err());
    }
}
