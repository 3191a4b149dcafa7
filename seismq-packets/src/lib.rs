pub mod ack;
pub mod connack;
pub mod connect;
pub mod empty;
pub mod publish;
pub mod subscribe;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use seismq_core::{
    codec::{Decoder, Encoder, RemainingLength},
    error::Error,
    Result,
};

use crate::{
    ack::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, UnsubAckPacket},
    connack::ConnAckPacket,
    connect::ConnectPacket,
    empty::{DisconnectPacket, PingReqPacket, PingRespPacket},
    publish::PublishPacket,
    subscribe::{SubAckPacket, SubscribePacket, UnsubscribePacket},
};

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum ControlPacket {
    Connect(ConnectPacket),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq(PingReqPacket),
    PingResp(PingRespPacket),
    Disconnect(DisconnectPacket),
}

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PacketType {
    Connect = 0x01,
    ConnAck,
    Publish,
    PubAck,
    PubRec,
    PubRel,
    PubComp,
    Subscribe,
    SubAck,
    Unsubscribe,
    UnsubAck,
    PingReq,
    PingResp,
    Disconnect,
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        use PacketType::*;

        let res = match value {
            0x01 => Connect,
            0x02 => ConnAck,
            0x03 => Publish,
            0x04 => PubAck,
            0x05 => PubRec,
            0x06 => PubRel,
            0x07 => PubComp,
            0x08 => Subscribe,
            0x09 => SubAck,
            0x0a => Unsubscribe,
            0x0b => UnsubAck,
            0x0c => PingReq,
            0x0d => PingResp,
            0x0e => Disconnect,
            _ => return Err(Error::MalformedPacket("unknown packet type")),
        };

        Ok(res)
    }
}

/// First byte and remaining length of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_len: usize,
}

impl FixedHeader {
    /// Reads the fixed header and makes sure the whole body is buffered.
    pub fn read<T: Buf>(buffer: &mut T) -> Result<Self> {
        let byte = u8::decode(buffer)?;
        let remaining_len = RemainingLength::decode(buffer)?.0 as usize;

        if buffer.remaining() < remaining_len {
            return Err(Error::PacketIncomplete);
        }

        Ok(FixedHeader {
            packet_type: (byte >> 4).try_into()?,
            flags: byte & 0x0f,
            remaining_len,
        })
    }

    /// Like `read`, but also enforces the flags the packet type must carry.
    pub(crate) fn read_as<T: Buf>(buffer: &mut T, expected: PacketType, flags: u8) -> Result<Self> {
        let header = Self::read(buffer)?;

        if header.packet_type != expected {
            return Err(Error::ProtocolError("unexpected packet type"));
        }

        if header.flags != flags {
            return Err(Error::MalformedPacket("invalid fixed header flags"));
        }

        Ok(header)
    }
}

/// Writes the fixed header for a packet whose body is `remaining_len` bytes.
pub(crate) fn put_fixed_header(
    buffer: &mut BytesMut,
    packet_type: PacketType,
    flags: u8,
    remaining_len: usize,
) {
    buffer.put_u8(((packet_type as u8) << 4) | flags);
    RemainingLength(remaining_len as u32).encode(buffer);
}

/// Total frame size for a body of `remaining_len` bytes.
pub(crate) fn frame_size(remaining_len: usize) -> usize {
    1 + RemainingLength(remaining_len as u32).encoded_size() + remaining_len
}

impl ControlPacket {
    /// Returns the length of the first frame in `src` once it is fully
    /// buffered, `Error::PacketIncomplete` otherwise.
    pub fn check(src: &[u8]) -> Result<usize> {
        let mut peeker = src;
        let header = FixedHeader::read(&mut peeker)?;

        Ok(frame_size(header.remaining_len))
    }

    /// Decodes and consumes exactly one frame from the front of `src`.
    ///
    /// `src` is left untouched when the frame is incomplete. Once a whole
    /// frame is buffered it is always consumed, and a body too short for
    /// its own fields is `Error::MalformedPacket`.
    pub fn parse(src: &mut BytesMut) -> Result<ControlPacket> {
        let frame_len = Self::check(src)?;
        let frame = src.split_to(frame_len).freeze();

        Self::decode_frame(frame).map_err(|e| match e {
            Error::PacketIncomplete => {
                Error::MalformedPacket("packet body shorter than its fields")
            }
            other => other,
        })
    }

    fn decode_frame(mut frame: Bytes) -> Result<ControlPacket> {
        use ControlPacket::*;

        let packet_type: PacketType = (frame[0] >> 4).try_into()?;

        let packet = match packet_type {
            PacketType::Connect => Connect(ConnectPacket::decode(&mut frame)?),
            PacketType::ConnAck => ConnAck(ConnAckPacket::decode(&mut frame)?),
            PacketType::Publish => Publish(PublishPacket::decode(&mut frame)?),
            PacketType::PubAck => PubAck(PubAckPacket::decode(&mut frame)?),
            PacketType::PubRec => PubRec(PubRecPacket::decode(&mut frame)?),
            PacketType::PubRel => PubRel(PubRelPacket::decode(&mut frame)?),
            PacketType::PubComp => PubComp(PubCompPacket::decode(&mut frame)?),
            PacketType::Subscribe => Subscribe(SubscribePacket::decode(&mut frame)?),
            PacketType::SubAck => SubAck(SubAckPacket::decode(&mut frame)?),
            PacketType::Unsubscribe => Unsubscribe(UnsubscribePacket::decode(&mut frame)?),
            PacketType::UnsubAck => UnsubAck(UnsubAckPacket::decode(&mut frame)?),
            PacketType::PingReq => PingReq(PingReqPacket::decode(&mut frame)?),
            PacketType::PingResp => PingResp(PingRespPacket::decode(&mut frame)?),
            PacketType::Disconnect => Disconnect(DisconnectPacket::decode(&mut frame)?),
        };

        Ok(packet)
    }
}

impl Encoder for ControlPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        use ControlPacket::*;

        match self {
            Connect(p) => p.encode(buffer),
            ConnAck(p) => p.encode(buffer),
            Publish(p) => p.encode(buffer),
            PubAck(p) => p.encode(buffer),
            PubRec(p) => p.encode(buffer),
            PubRel(p) => p.encode(buffer),
            PubComp(p) => p.encode(buffer),
            Subscribe(p) => p.encode(buffer),
            SubAck(p) => p.encode(buffer),
            Unsubscribe(p) => p.encode(buffer),
            UnsubAck(p) => p.encode(buffer),
            PingReq(p) => p.encode(buffer),
            PingResp(p) => p.encode(buffer),
            Disconnect(p) => p.encode(buffer),
        }
    }

    fn encoded_size(&self) -> usize {
        use ControlPacket::*;

        match self {
            Connect(p) => p.encoded_size(),
            ConnAck(p) => p.encoded_size(),
            Publish(p) => p.encoded_size(),
            PubAck(p) => p.encoded_size(),
            PubRec(p) => p.encoded_size(),
            PubRel(p) => p.encoded_size(),
            PubComp(p) => p.encoded_size(),
            Subscribe(p) => p.encoded_size(),
            SubAck(p) => p.encoded_size(),
            Unsubscribe(p) => p.encoded_size(),
            UnsubAck(p) => p.encoded_size(),
            PingReq(p) => p.encoded_size(),
            PingResp(p) => p.encoded_size(),
            Disconnect(p) => p.encoded_size(),
        }
    }
}
