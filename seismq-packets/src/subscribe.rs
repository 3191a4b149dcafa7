use bytes::{Buf, BytesMut};

use seismq_core::{
    codec::{Decoder, Encoder},
    error::Error,
    qos::QoS,
    return_code::SubscribeReturnCode,
};

use crate::{frame_size, put_fixed_header, FixedHeader, PacketType};

/// SUBSCRIBE and UNSUBSCRIBE carry these reserved fixed header flags.
const SUBSCRIBE_FLAGS: u8 = 0b0010;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<(String, QoS)>,
}

impl SubscribePacket {
    fn remaining_len(&self) -> usize {
        2 + self
            .filters
            .iter()
            .map(|(filter, _)| filter.encoded_size() + 1)
            .sum::<usize>()
    }
}

impl Encoder for SubscribePacket {
    fn encode(&self, buffer: &mut BytesMut) {
        put_fixed_header(buffer, PacketType::Subscribe, SUBSCRIBE_FLAGS, self.remaining_len());
        self.packet_id.encode(buffer);

        for (filter, qos) in &self.filters {
            filter.encode(buffer);
            (*qos as u8).encode(buffer);
        }
    }

    fn encoded_size(&self) -> usize {
        frame_size(self.remaining_len())
    }
}

impl Decoder for SubscribePacket {
    fn decode<T: Buf>(buffer: &mut T) -> seismq_core::Result<Self> {
        let header = FixedHeader::read_as(buffer, PacketType::Subscribe, SUBSCRIBE_FLAGS)?;
        let end = buffer.remaining() - header.remaining_len;

        let packet_id = u16::decode(buffer)?;
        let mut filters = Vec::new();

        while buffer.remaining() > end {
            let filter = String::decode(buffer)?;
            let options = u8::decode(buffer)?;
            if options & 0b1111_1100 != 0 {
                return Err(Error::MalformedPacket("reserved subscription option bits set"));
            }
            filters.push((filter, QoS::try_from(options)?));
        }

        // [MQTT-3.8.3-3] at least one filter
        if filters.is_empty() {
            return Err(Error::ProtocolError("SUBSCRIBE without topic filters"));
        }

        Ok(SubscribePacket { packet_id, filters })
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub return_codes: Vec<SubscribeReturnCode>,
}

impl Encoder for SubAckPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        put_fixed_header(buffer, PacketType::SubAck, 0, 2 + self.return_codes.len());
        self.packet_id.encode(buffer);

        for code in &self.return_codes {
            code.code().encode(buffer);
        }
    }

    fn encoded_size(&self) -> usize {
        frame_size(2 + self.return_codes.len())
    }
}

impl Decoder for SubAckPacket {
    fn decode<T: Buf>(buffer: &mut T) -> seismq_core::Result<Self> {
        let header = FixedHeader::read_as(buffer, PacketType::SubAck, 0)?;
        if header.remaining_len < 2 {
            return Err(Error::MalformedPacket("SUBACK too short"));
        }

        let packet_id = u16::decode(buffer)?;
        let return_codes = (0..header.remaining_len - 2)
            .map(|_| SubscribeReturnCode::try_from(buffer.get_u8()))
            .collect::<seismq_core::Result<Vec<_>>>()?;

        Ok(SubAckPacket {
            packet_id,
            return_codes,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<String>,
}

impl UnsubscribePacket {
    fn remaining_len(&self) -> usize {
        2 + self.filters.encoded_size()
    }
}

impl Encoder for UnsubscribePacket {
    fn encode(&self, buffer: &mut BytesMut) {
        put_fixed_header(
            buffer,
            PacketType::Unsubscribe,
            SUBSCRIBE_FLAGS,
            self.remaining_len(),
        );
        self.packet_id.encode(buffer);
        self.filters.encode(buffer);
    }

    fn encoded_size(&self) -> usize {
        frame_size(self.remaining_len())
    }
}

impl Decoder for UnsubscribePacket {
    fn decode<T: Buf>(buffer: &mut T) -> seismq_core::Result<Self> {
        let header = FixedHeader::read_as(buffer, PacketType::Unsubscribe, SUBSCRIBE_FLAGS)?;
        let end = buffer.remaining() - header.remaining_len;

        let packet_id = u16::decode(buffer)?;
        let mut filters = Vec::new();

        while buffer.remaining() > end {
            filters.push(String::decode(buffer)?);
        }

        if filters.is_empty() {
            return Err(Error::ProtocolError("UNSUBSCRIBE without topic filters"));
        }

        Ok(UnsubscribePacket { packet_id, filters })
    }
}
