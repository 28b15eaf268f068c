//! Error types for RSP framing.

/// Problems found while splitting the incoming byte stream into packets.
///
/// None of these are fatal: the framer logs them and carries on with the next
/// byte or packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    /// A byte outside of a packet that is not `+`, `-` or `0x03`.
    #[error("broken packet: unexpected leading byte {0:#04x}")]
    UnexpectedByte(u8),

    /// The two characters after `#` are not a hex number.
    #[error("invalid checksum format in packet {0:?}")]
    InvalidChecksumFormat(String),

    /// The checksum does not match the packet body.
    #[error("bad checksum: computed {actual:02x} vs received {expected:02x} in {body:?}")]
    ChecksumMismatch {
        /// Checksum sent by the client.
        expected: u8,
        /// Checksum computed over the received body.
        actual: u8,
        /// The packet body, lossily decoded for logging.
        body: String,
    },

    /// A packet start was seen but no terminator arrived within the size limit.
    #[error("unterminated packet of {len} bytes exceeds maximum of {max}")]
    Oversized {
        /// Number of buffered bytes that were discarded.
        len: usize,
        /// The configured limit.
        max: usize,
    },
}

/// Failure to hand bytes to the GDB connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// No GDB client is attached.
    #[error("no gdb connection")]
    NoConnection,

    /// The writer side of the connection has gone away.
    #[error("gdb connection is not connected")]
    NotConnected,
}
