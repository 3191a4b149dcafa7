//! Packets made of a bare fixed header.

use bytes::{Buf, BytesMut};

use seismq_core::{
    codec::{Decoder, Encoder},
    error::Error,
};

use crate::{frame_size, put_fixed_header, FixedHeader, PacketType};

macro_rules! header_only {
    ($name:ident, $packet_type:expr) => {
        #[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
        pub struct $name;

        impl Encoder for $name {
            fn encode(&self, buffer: &mut BytesMut) {
                put_fixed_header(buffer, $packet_type, 0, 0);
            }

            fn encoded_size(&self) -> usize {
                frame_size(0)
            }
        }

        impl Decoder for $name {
            fn decode<T: Buf>(buffer: &mut T) -> seismq_core::Result<Self> {
                let header = FixedHeader::read_as(buffer, $packet_type, 0)?;
                if header.remaining_len != 0 {
                    return Err(Error::MalformedPacket("unexpected remaining length"));
                }

                Ok($name)
            }
        }
    };
}

header_only!(PingReqPacket, PacketType::PingReq);
header_only!(PingRespPacket, PacketType::PingResp);
header_only!(DisconnectPacket, PacketType::Disconnect);
