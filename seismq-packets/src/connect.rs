use bytes::{Buf, Bytes, BytesMut};

use seismq_core::{
    codec::{Decoder, Encoder},
    error::Error,
    protocol::ProtocolVersion,
};

use crate::{frame_size, put_fixed_header, FixedHeader, PacketType};

const USER_NAME_FLAG: u8 = 0b1000_0000;
const PASSWORD_FLAG: u8 = 0b0100_0000;
const WILL_FLAG: u8 = 0b0000_0100;
const CLEAN_SESSION_FLAG: u8 = 0b0000_0010;
const RESERVED_FLAG: u8 = 0b0000_0001;

/// CONNECT packet without a will message.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ConnectPacket {
    pub protocol_version: ProtocolVersion,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: String,
    pub user_name: Option<String>,
    pub password: Option<Bytes>,
}

impl ConnectPacket {
    fn flags(&self) -> u8 {
        let mut flags = 0;

        if self.user_name.is_some() {
            flags |= USER_NAME_FLAG;
        }

        if self.password.is_some() {
            flags |= PASSWORD_FLAG;
        }

        if self.clean_session {
            flags |= CLEAN_SESSION_FLAG;
        }

        flags
    }

    fn remaining_len(&self) -> usize {
        self.protocol_version.protocol_name().encoded_size()
            + 1 // protocol level
            + 1 // connect flags
            + self.keep_alive.encoded_size()
            + self.client_id.encoded_size()
            + self.user_name.encoded_size()
            + self.password.encoded_size()
    }
}

impl Encoder for ConnectPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        put_fixed_header(buffer, PacketType::Connect, 0, self.remaining_len());

        // Variable header
        self.protocol_version.protocol_name().encode(buffer);
        self.protocol_version.protocol_level().encode(buffer);
        self.flags().encode(buffer);
        self.keep_alive.encode(buffer);

        // Payload
        self.client_id.encode(buffer);
        self.user_name.encode(buffer);
        self.password.encode(buffer);
    }

    fn encoded_size(&self) -> usize {
        frame_size(self.remaining_len())
    }
}

impl Decoder for ConnectPacket {
    fn decode<T: Buf>(buffer: &mut T) -> seismq_core::Result<Self> {
        FixedHeader::read_as(buffer, PacketType::Connect, 0)?;

        let protocol_name = String::decode(buffer)?;
        let protocol_version = u8::decode(buffer)
            .map(ProtocolVersion::from_level)?
            .filter(|v| v.protocol_name() == protocol_name)
            .ok_or(Error::ProtocolError("unsupported protocol version"))?;

        let flags = u8::decode(buffer)?;
        if flags & RESERVED_FLAG != 0 {
            return Err(Error::MalformedPacket("reserved CONNECT flag set"));
        }
        if flags & WILL_FLAG != 0 {
            return Err(Error::ProtocolError("will messages are not supported"));
        }

        let keep_alive = u16::decode(buffer)?;
        let client_id = String::decode(buffer)?;

        let user_name = match flags & USER_NAME_FLAG {
            0 => None,
            _ => Some(String::decode(buffer)?),
        };

        let password = match flags & PASSWORD_FLAG {
            0 => None,
            _ => Some(Bytes::decode(buffer)?),
        };

        Ok(ConnectPacket {
            protocol_version,
            clean_session: flags & CLEAN_SESSION_FLAG != 0,
            keep_alive,
            client_id,
            user_name,
            password,
        })
    }
}
