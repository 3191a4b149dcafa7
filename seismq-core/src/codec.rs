use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;

/// Largest value the four-byte remaining length field can carry.
pub const MAX_REMAINING_LENGTH: u32 = 268_435_455;

pub trait Decoder {
    fn decode<T>(buffer: &mut T) -> crate::Result<Self>
    where
        Self: Sized,
        T: Buf;
}

pub trait Encoder {
    fn encode(&self, buffer: &mut BytesMut);

    /// Number of bytes `encode` appends.
    fn encoded_size(&self) -> usize;
}

/// The variable length "Remaining Length" of the fixed header.
///
/// Seven bits per byte, least significant group first, with the high bit
/// flagging a continuation. At most four bytes.
#[derive(PartialEq, Eq, Debug, Default, Clone, Copy)]
pub struct RemainingLength(pub u32);

impl Encoder for RemainingLength {
    fn encode(&self, buffer: &mut BytesMut) {
        let mut x = self.0;

        loop {
            let mut byte = (x % 128) as u8;
            x /= 128;

            if x > 0 {
                byte |= 0x80;
            }

            buffer.put_u8(byte);

            if x == 0 {
                break;
            }
        }
    }

    fn encoded_size(&self) -> usize {
        match self.0 {
            0..=127 => 1,
            128..=16_383 => 2,
            16_384..=2_097_151 => 3,
            _ => 4,
        }
    }
}

impl Decoder for RemainingLength {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let mut value: u32 = 0;

        for shift in 0..4 {
            if !buffer.has_remaining() {
                return Err(Error::PacketIncomplete);
            }

            let byte = buffer.get_u8();
            value += ((byte & 0x7f) as u32) << (7 * shift);

            if byte & 0x80 == 0 {
                return Ok(RemainingLength(value));
            }
        }

        Err(Error::MalformedPacket("remaining length exceeds four bytes"))
    }
}

impl Encoder for u8 {
    fn encode(&self, buffer: &mut BytesMut) {
        buffer.put_u8(*self);
    }

    fn encoded_size(&self) -> usize {
        1
    }
}

impl Decoder for u8 {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        if !buffer.has_remaining() {
            return Err(Error::PacketIncomplete);
        }

        Ok(buffer.get_u8())
    }
}

impl Encoder for u16 {
    fn encode(&self, buffer: &mut BytesMut) {
        buffer.put_u16(*self);
    }

    fn encoded_size(&self) -> usize {
        2
    }
}

impl Decoder for u16 {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        if buffer.remaining() < 2 {
            return Err(Error::PacketIncomplete);
        }

        Ok(buffer.get_u16())
    }
}

/// Length-prefixed UTF-8 string.
impl Encoder for str {
    fn encode(&self, buffer: &mut BytesMut) {
        buffer.put_u16(self.len() as u16);
        buffer.put_slice(self.as_bytes());
    }

    fn encoded_size(&self) -> usize {
        2 + self.len()
    }
}

impl Encoder for String {
    fn encode(&self, buffer: &mut BytesMut) {
        self.as_str().encode(buffer);
    }

    fn encoded_size(&self) -> usize {
        self.as_str().encoded_size()
    }
}

impl Decoder for String {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let bytes = Bytes::decode(buffer)?;

        String::from_utf8(bytes.to_vec()).map_err(|_| Error::MalformedPacket("invalid UTF-8 string"))
    }
}

/// Length-prefixed binary data.
impl Encoder for Bytes {
    fn encode(&self, buffer: &mut BytesMut) {
        buffer.put_u16(self.len() as u16);
        buffer.put_slice(self);
    }

    fn encoded_size(&self) -> usize {
        2 + self.len()
    }
}

impl Decoder for Bytes {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let length = u16::decode(buffer)? as usize;

        if buffer.remaining() < length {
            return Err(Error::PacketIncomplete);
        }

        Ok(buffer.copy_to_bytes(length))
    }
}

impl<T: Encoder> Encoder for Option<T> {
    fn encode(&self, buffer: &mut BytesMut) {
        if let Some(v) = self {
            v.encode(buffer);
        }
    }

    fn encoded_size(&self) -> usize {
        self.as_ref().map_or(0, Encoder::encoded_size)
    }
}

impl<T: Encoder> Encoder for Vec<T> {
    fn encode(&self, buffer: &mut BytesMut) {
        for e in self {
            e.encode(buffer);
        }
    }

    fn encoded_size(&self) -> usize {
        self.iter().map(Encoder::encoded_size).sum()
    }
}
