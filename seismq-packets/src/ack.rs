//! Packets whose body is a single packet identifier.

use bytes::{Buf, BytesMut};

use seismq_core::{
    codec::{Decoder, Encoder},
    error::Error,
};

use crate::{frame_size, put_fixed_header, FixedHeader, PacketType};

macro_rules! packet_id_only {
    ($(#[$doc:meta])* $name:ident, $packet_type:expr, $flags:expr) => {
        $(#[$doc])*
        #[derive(Debug, PartialEq, Eq, Clone, Copy)]
        pub struct $name {
            pub packet_id: u16,
        }

        impl Encoder for $name {
            fn encode(&self, buffer: &mut BytesMut) {
                put_fixed_header(buffer, $packet_type, $flags, 2);
                self.packet_id.encode(buffer);
            }

            fn encoded_size(&self) -> usize {
                frame_size(2)
            }
        }

        impl Decoder for $name {
            fn decode<T: Buf>(buffer: &mut T) -> seismq_core::Result<Self> {
                let header = FixedHeader::read_as(buffer, $packet_type, $flags)?;
                if header.remaining_len != 2 {
                    return Err(Error::MalformedPacket("unexpected remaining length"));
                }

                Ok($name {
                    packet_id: u16::decode(buffer)?,
                })
            }
        }
    };
}

packet_id_only!(
    /// QoS 1 acknowledgement.
    PubAckPacket,
    PacketType::PubAck,
    0
);
packet_id_only!(
    /// First step of the QoS 2 handshake.
    PubRecPacket,
    PacketType::PubRec,
    0
);
packet_id_only!(
    /// Second step of the QoS 2 handshake; carries the mandatory 0b0010 flags.
    PubRelPacket,
    PacketType::PubRel,
    0b0010
);
packet_id_only!(
    /// Final step of the QoS 2 handshake.
    PubCompPacket,
    PacketType::PubComp,
    0
);
packet_id_only!(UnsubAckPacket, PacketType::UnsubAck, 0);
