use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::reader::CodaReader;
use crate::writer::CodaWriter;

/// A byte stream that can be split into independent read and write halves.
pub trait CodaTransport: Send + 'static {
    type Read: AsyncRead + Unpin + Send + 'static;
    type Write: AsyncWrite + Unpin + Send + 'static;

    fn into_split(self) -> (Self::Read, Self::Write);
}

impl CodaTransport for TcpStream {
    type Read = OwnedReadHalf;
    type Write = OwnedWriteHalf;

    fn into_split(self) -> (Self::Read, Self::Write) {
        TcpStream::into_split(self)
    }
}

/// Split a transport into a message reader and writer.
pub fn split<T: CodaTransport>(transport: T) -> (CodaReader<T::Read>, CodaWriter<T::Write>) {
    let (read, write) = transport.into_split();
    (CodaReader::new(read), CodaWriter::new(write))
}
