//! In-memory transport for tests.

use tokio::io::{DuplexStream, duplex};

use crate::transport::CodaTransport;

/// One end of an in-memory connection.
pub struct MemoryTransport {
    read: DuplexStream,
    write: DuplexStream,
}

impl MemoryTransport {
    /// A connected pair: what one end writes the other reads.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_buffer_size(64 * 1024)
    }

    pub fn pair_with_buffer_size(buffer_size: usize) -> (Self, Self) {
        let (a_to_b_write, a_to_b_read) = duplex(buffer_size);
        let (b_to_a_write, b_to_a_read) = duplex(buffer_size);

        let a = MemoryTransport {
            read: b_to_a_read,
            write: a_to_b_write,
        };
        let b = MemoryTransport {
            read: a_to_b_read,
            write: b_to_a_write,
        };
        (a, b)
    }
}

impl CodaTransport for MemoryTransport {
    type Read = DuplexStream;
    type Write = DuplexStream;

    fn into_split(self) -> (Self::Read, Self::Write) {
        (self.read, self.write)
    }
}
