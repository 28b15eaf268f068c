//! tokio-util codec for the client side of an RSP connection.
//!
//! Decoding follows exactly the same rules as [`RspFramer::feed`](crate::RspFramer::feed),
//! so a test that plays GDB sees replies the way the bridge sees requests.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::framer::{DEFAULT_MAX_PACKET_SIZE, RspEvent, decode_event};
use crate::packet;

/// Something to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RspFrame {
    Ack,
    Nak,
    Interrupt,
    /// A packet body, framed with `$`, `#` and the checksum on encode.
    Packet(Bytes),
}

impl RspFrame {
    pub fn packet(body: impl AsRef<[u8]>) -> Self {
        Self::Packet(Bytes::copy_from_slice(body.as_ref()))
    }
}

#[derive(Debug, Clone)]
pub struct RspCodec {
    max_packet_size: usize,
}

impl RspCodec {
    pub fn new() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        Self { max_packet_size }
    }
}

impl Default for RspCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RspCodec {
    type Item = RspEvent;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(decode_event(src, self.max_packet_size))
    }
}

impl Encoder<RspFrame> for RspCodec {
    type Error = io::Error;

    fn encode(&mut self, item: RspFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            RspFrame::Ack => dst.put_u8(b'+'),
            RspFrame::Nak => dst.put_u8(b'-'),
            RspFrame::Interrupt => dst.put_u8(0x03),
            RspFrame::Packet(body) => dst.put_slice(&packet::frame(&body)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Packet;

    #[test]
    fn encode_then_decode() {
        let mut codec = RspCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(RspFrame::Ack, &mut buf).unwrap();
        codec.encode(RspFrame::packet("m1000,4"), &mut buf).unwrap();
        codec.encode(RspFrame::Interrupt, &mut buf).unwrap();

        assert_eq!(&buf[..], b"+$m1000,4#8e\x03");

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(RspEvent::Ack));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(RspEvent::Packet(Packet {
                body: Bytes::from_static(b"m1000,4"),
                checksum_ok: true,
            }))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(RspEvent::Interrupt));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn decode_keeps_partial_packet() {
        let mut codec = RspCodec::new();
        let mut buf = BytesMut::from(&b"$OK#9"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 5);
    }
}
