use bytes::BytesMut;
use seismq_core::{codec::Encoder, error::Error};
use seismq_packets::ControlPacket;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;

/// Anything a connection can run over: plain TCP or TLS.
pub(crate) trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Stream for S {}

/// A connection to an MQTT broker with packet framing.
pub(crate) struct Connection {
    stream: Box<dyn Stream>,
    read_buffer: BytesMut,
}

impl Connection {
    pub fn new(stream: impl Stream + 'static) -> Self {
        Self {
            stream: Box::new(stream),
            read_buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Write a control packet to the connection.
    pub async fn write_packet(&mut self, packet: ControlPacket) -> Result<(), TransportError> {
        let mut buffer = BytesMut::with_capacity(packet.encoded_size());
        packet.encode(&mut buffer);
        self.stream.write_all(&buffer).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read a control packet from the connection.
    ///
    /// Returns `None` if the broker closed the connection cleanly. Cancel
    /// safe: partial frames stay in the read buffer.
    pub async fn read_packet(&mut self) -> Result<Option<ControlPacket>, TransportError> {
        loop {
            match ControlPacket::parse(&mut self.read_buffer) {
                Ok(packet) => return Ok(Some(packet)),
                Err(Error::PacketIncomplete) => {}
                Err(e) => return Err(e.into()),
            }

            if self.stream.read_buf(&mut self.read_buffer).await? == 0 {
                if self.read_buffer.is_empty() {
                    return Ok(None);
                }

                return Err(TransportError::Decode(
                    "connection closed mid-packet".to_string(),
                ));
            }
        }
    }

    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}
