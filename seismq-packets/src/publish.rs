use bytes::{Buf, BufMut, Bytes, BytesMut};

use seismq_core::{
    codec::{Decoder, Encoder},
    error::Error,
    qos::QoS,
};

use crate::{frame_size, put_fixed_header, FixedHeader, PacketType};

const DUP_FLAG: u8 = 0b1000;
const RETAIN_FLAG: u8 = 0b0001;

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct PublishPacket {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    /// Present if and only if `qos` is above `AtMostOnce`.
    pub packet_id: Option<u16>,
    pub payload: Bytes,
}

impl PublishPacket {
    fn flags(&self) -> u8 {
        let mut flags = (self.qos as u8) << 1;

        if self.dup {
            flags |= DUP_FLAG;
        }

        if self.retain {
            flags |= RETAIN_FLAG;
        }

        flags
    }

    fn remaining_len(&self) -> usize {
        self.topic.encoded_size() + self.packet_id.encoded_size() + self.payload.len()
    }
}

impl Encoder for PublishPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        put_fixed_header(buffer, PacketType::Publish, self.flags(), self.remaining_len());

        self.topic.encode(buffer);
        self.packet_id.encode(buffer);

        // The payload is not length-prefixed
        buffer.put_slice(&self.payload);
    }

    fn encoded_size(&self) -> usize {
        frame_size(self.remaining_len())
    }
}

impl Decoder for PublishPacket {
    fn decode<T: Buf>(buffer: &mut T) -> seismq_core::Result<Self> {
        let header = FixedHeader::read(buffer)?;
        if header.packet_type != PacketType::Publish {
            return Err(Error::ProtocolError("unexpected packet type"));
        }

        let qos = QoS::try_from((header.flags >> 1) & 0b11)?;
        let dup = header.flags & DUP_FLAG != 0;
        if dup && qos == QoS::AtMostOnce {
            return Err(Error::MalformedPacket("DUP set on a QoS 0 PUBLISH"));
        }

        let before = buffer.remaining();
        let topic = String::decode(buffer)?;
        let packet_id = match qos {
            QoS::AtMostOnce => None,
            _ => Some(u16::decode(buffer)?),
        };

        let header_len = before - buffer.remaining();
        let payload_len = header
            .remaining_len
            .checked_sub(header_len)
            .ok_or(Error::MalformedPacket("PUBLISH variable header overruns packet"))?;

        Ok(PublishPacket {
            dup,
            qos,
            retain: header.flags & RETAIN_FLAG != 0,
            topic,
            packet_id,
            payload: buffer.copy_to_bytes(payload_len),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_qos0_encoding() {
        let packet = PublishPacket {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic: "sensors/quake".into(),
            packet_id: None,
            payload: Bytes::from_static(b"M5.2"),
        };

        let mut expected = vec![0x30, 0x13, 0x00, 0x0d];
        expected.extend_from_slice(b"sensors/quake");
        expected.extend_from_slice(b"M5.2");

        let mut encoded = BytesMut::new();
        packet.encode(&mut encoded);
        assert_eq!(encoded.to_vec(), expected);

        let decoded = PublishPacket::decode(&mut encoded.freeze()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_publish_qos2_retain_with_trailing_frame() {
        let packet = PublishPacket {
            dup: true,
            qos: QoS::ExactlyOnce,
            retain: true,
            topic: "a/b".into(),
            packet_id: Some(7),
            payload: Bytes::from_static(&[0xde, 0xad]),
        };

        let mut encoded = BytesMut::new();
        packet.encode(&mut encoded);
        assert_eq!(encoded[0], 0x3d);

        // A following PINGRESP must not leak into the payload
        encoded.extend_from_slice(&[0xd0, 0x00]);

        let mut bytes = encoded.freeze();
        let decoded = PublishPacket::decode(&mut bytes).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(bytes.as_ref(), &[0xd0, 0x00]);
    }

    #[test]
    fn test_publish_empty_payload() {
        let mut encoded = Bytes::from_static(&[0x30, 0x03, 0x00, 0x01, b't']);

        let decoded = PublishPacket::decode(&mut encoded).unwrap();
        assert_eq!(decoded.topic, "t");
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_publish_invalid_qos() {
        let mut encoded = Bytes::from_static(&[0x36, 0x03, 0x00, 0x01, b't']);

        assert!(PublishPacket::decode(&mut encoded).is_err());
    }
}
