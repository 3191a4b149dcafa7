use bytes::{Buf, BytesMut};

use seismq_core::{
    codec::{Decoder, Encoder},
    error::Error,
    return_code::ConnectReturnCode,
};

use crate::{frame_size, put_fixed_header, FixedHeader, PacketType};

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub code: ConnectReturnCode,
}

const REMAINING_LEN: usize = 2;

impl Encoder for ConnAckPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        put_fixed_header(buffer, PacketType::ConnAck, 0, REMAINING_LEN);
        (self.session_present as u8).encode(buffer);
        self.code.code().encode(buffer);
    }

    fn encoded_size(&self) -> usize {
        frame_size(REMAINING_LEN)
    }
}

impl Decoder for ConnAckPacket {
    fn decode<T: Buf>(buffer: &mut T) -> seismq_core::Result<Self> {
        let header = FixedHeader::read_as(buffer, PacketType::ConnAck, 0)?;
        if header.remaining_len != REMAINING_LEN {
            return Err(Error::MalformedPacket("CONNACK remaining length must be 2"));
        }

        let ack_flags = u8::decode(buffer)?;
        if ack_flags & 0b1111_1110 != 0 {
            return Err(Error::MalformedPacket("reserved CONNACK flags set"));
        }

        let code = ConnectReturnCode::try_from(u8::decode(buffer)?)?;

        Ok(ConnAckPacket {
            session_present: ack_flags & 0x01 != 0,
            code,
        })
    }
}
