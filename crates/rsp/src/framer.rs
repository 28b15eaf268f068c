//! Incremental RSP framer.

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::mpsc;

use crate::error::{FramingError, SendError};
use crate::packet;

/// Largest unterminated packet kept in the buffer while waiting for `#`.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 16 * 1024;

const INTERRUPT: u8 = 0x03;

/// A complete packet received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Bytes between `$` and `#`.
    pub body: Bytes,
    /// Whether the received checksum matched. Mismatches are still delivered.
    pub checksum_ok: bool,
}

/// Something the client sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RspEvent {
    /// `+`
    Ack,
    /// `-`, a retransmission request. Logged only, never honoured.
    Nak,
    /// The out-of-band `0x03` byte.
    Interrupt,
    /// `$<body>#<checksum>`
    Packet(Packet),
}

/// Pull the next event off the front of `buf`.
///
/// Returns `None` when the buffer is empty or holds an incomplete packet, in
/// which case the incomplete bytes stay in the buffer.
pub(crate) fn decode_event(buf: &mut BytesMut, max_packet_size: usize) -> Option<RspEvent> {
    loop {
        let &first = buf.first()?;
        match first {
            b'+' => {
                buf.advance(1);
                return Some(RspEvent::Ack);
            }
            b'-' => {
                buf.advance(1);
                tracing::warn!("NAK: retransmission requested, not resending");
                return Some(RspEvent::Nak);
            }
            INTERRUPT => {
                buf.advance(1);
                return Some(RspEvent::Interrupt);
            }
            b'$' => {
                let Some(hash) = buf.iter().position(|&b| b == b'#') else {
                    if buf.len() > max_packet_size {
                        let err = FramingError::Oversized {
                            len: buf.len(),
                            max: max_packet_size,
                        };
                        tracing::error!(error = %err, "discarding buffered input");
                        buf.clear();
                    }
                    return None;
                };

                if buf.len() < hash + 3 {
                    // checksum characters not here yet
                    return None;
                }

                let body = Bytes::copy_from_slice(&buf[1..hash]);
                let received = packet::parse_hex(&buf[hash + 1..hash + 3]);
                buf.advance(hash + 3);

                let Some(expected) = received.map(|c| c as u8) else {
                    let err = FramingError::InvalidChecksumFormat(lossy(&body));
                    tracing::error!(error = %err, "dropping packet");
                    continue;
                };

                let actual = packet::checksum(&body);
                let checksum_ok = actual == expected;
                if !checksum_ok {
                    let err = FramingError::ChecksumMismatch {
                        expected,
                        actual,
                        body: lossy(&body),
                    };
                    tracing::error!(error = %err, "accepting packet anyway");
                }

                return Some(RspEvent::Packet(Packet { body, checksum_ok }));
            }
            other => {
                let err = FramingError::UnexpectedByte(other);
                tracing::error!(error = %err, "dropping byte");
                buf.advance(1);
            }
        }
    }
}

fn lossy(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

/// Push-based framer for one GDB connection.
///
/// Incoming bytes go through [`RspFramer::feed`]; outgoing acknowledgements and
/// replies are written to the attached connection, if any.
#[derive(Debug)]
pub struct RspFramer {
    buffer: BytesMut,
    max_packet_size: usize,
    ack_mode: bool,
    output: Option<mpsc::UnboundedSender<Bytes>>,
}

impl Default for RspFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PACKET_SIZE)
    }
}

impl RspFramer {
    /// Create a framer with no connection attached and acknowledgements on.
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_packet_size,
            ack_mode: true,
            output: None,
        }
    }

    /// Attach the writer side of a GDB connection.
    ///
    /// A new connection starts a new session, so the read buffer is dropped and
    /// acknowledgement mode is switched back on.
    pub fn connect(&mut self, output: mpsc::UnboundedSender<Bytes>) {
        self.buffer.clear();
        self.ack_mode = true;
        self.output = Some(output);
    }

    /// Forget the current connection.
    pub fn disconnect(&mut self) {
        self.output = None;
        self.buffer.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.output.as_ref().is_some_and(|o| !o.is_closed())
    }

    /// Append `bytes` to the read buffer and return every complete event.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<RspEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(event) = decode_event(&mut self.buffer, self.max_packet_size) {
            events.push(event);
        }
        events
    }

    /// Bytes held back while waiting for the rest of a packet.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn ack_mode(&self) -> bool {
        self.ack_mode
    }

    /// Stop sending `+` for the rest of the session. There is no way back.
    pub fn disable_ack_mode(&mut self) {
        self.ack_mode = false;
    }

    /// Send `+` unless acknowledgements have been switched off.
    pub fn send_ack(&self) -> Result<(), SendError> {
        if !self.ack_mode {
            return Ok(());
        }
        self.write(Bytes::from_static(b"+"))
    }

    /// Frame and send a reply packet. `note` only goes to the log.
    pub fn send_packet(&self, body: &[u8], note: &str) -> Result<(), SendError> {
        tracing::debug!(
            packet = %String::from_utf8_lossy(body),
            note,
            "gdb: <-"
        );
        self.write(packet::frame(body))
    }

    fn write(&self, bytes: Bytes) -> Result<(), SendError> {
        let output = self.output.as_ref().ok_or(SendError::NoConnection)?;
        output.send(bytes).map_err(|_| SendError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(body: &str) -> RspEvent {
        RspEvent::Packet(Packet {
            body: Bytes::copy_from_slice(body.as_bytes()),
            checksum_ok: true,
        })
    }

    #[test]
    fn single_packet() {
        let mut framer = RspFramer::default();
        let events = framer.feed(b"$qSupported#37");
        assert_eq!(events, vec![packet("qSupported")]);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn acks_and_interrupts_outside_packets() {
        let mut framer = RspFramer::default();
        let events = framer.feed(b"+$g#67-\x03");
        assert_eq!(
            events,
            vec![RspEvent::Ack, packet("g"), RspEvent::Nak, RspEvent::Interrupt]
        );
    }

    #[test]
    fn checksum_mismatch_is_still_dispatched() {
        let mut framer = RspFramer::default();
        let events = framer.feed(b"$g#00");
        assert_eq!(
            events,
            vec![RspEvent::Packet(Packet {
                body: Bytes::from_static(b"g"),
                checksum_ok: false,
            })]
        );
    }

    #[test]
    fn garbage_bytes_are_skipped() {
        let mut framer = RspFramer::default();
        let events = framer.feed(b"xyz$g#67");
        assert_eq!(events, vec![packet("g")]);
    }

    #[test]
    fn invalid_checksum_format_drops_packet() {
        let mut framer = RspFramer::default();
        let events = framer.feed(b"$g#zz$c#63");
        assert_eq!(events, vec![packet("c")]);
    }

    #[test]
    fn incomplete_packet_waits_for_more_input() {
        let mut framer = RspFramer::default();
        assert!(framer.feed(b"$m1000,").is_empty());
        assert!(framer.feed(b"4#").is_empty());
        assert!(framer.feed(b"8").is_empty());
        assert_eq!(framer.feed(b"e"), vec![packet("m1000,4")]);
    }

    #[test]
    fn unterminated_oversized_packet_is_discarded() {
        let mut framer = RspFramer::new(8);
        assert!(framer.feed(b"$0123456789").is_empty());
        assert_eq!(framer.buffered(), 0);
        assert_eq!(framer.feed(b"$g#67"), vec![packet("g")]);
    }

    #[test]
    fn send_without_connection_fails() {
        let framer = RspFramer::default();
        assert_eq!(framer.send_packet(b"OK", ""), Err(SendError::NoConnection));
    }

    #[test]
    fn send_after_receiver_dropped_fails() {
        let mut framer = RspFramer::default();
        let (tx, rx) = mpsc::unbounded_channel();
        framer.connect(tx);
        drop(rx);
        assert_eq!(framer.send_ack(), Err(SendError::NotConnected));
    }

    #[test]
    fn ack_mode_is_one_way() {
        let mut framer = RspFramer::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        framer.connect(tx);

        framer.send_ack().unwrap();
        assert_eq!(&rx.try_recv().unwrap()[..], b"+");

        framer.disable_ack_mode();
        framer.send_ack().unwrap();
        assert!(rx.try_recv().is_err());

        framer.send_packet(b"OK", "").unwrap();
        assert_eq!(&rx.try_recv().unwrap()[..], b"$OK#9a");
    }
}
