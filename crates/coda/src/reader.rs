use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use pin_project_lite::pin_project;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::codec::CodaCodec;
use crate::error::CodecError;
use crate::message::Message;

pin_project! {
    /// Stream of messages decoded from the agent connection.
    pub struct CodaReader<R> {
        #[pin]
        inner: FramedRead<R, CodaCodec>,
    }
}

impl<R> CodaReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            inner: FramedRead::new(reader, CodaCodec::new()),
        }
    }
}

impl<R> Stream for CodaReader<R>
where
    R: AsyncRead + Unpin,
{
    type Item = Result<Message, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Cursor;

    #[tokio::test]
    async fn read_event_then_reply() {
        let mut data = b"E\x00Locator\x00Hello\x00[]\x00\x03\x01".to_vec();
        data.extend_from_slice(b"R\x001\x00\x00\x00\x03\x01");
        let mut reader = CodaReader::new(Cursor::new(data));

        assert!(matches!(
            reader.next().await.unwrap().unwrap(),
            Message::Event { .. }
        ));
        assert!(matches!(
            reader.next().await.unwrap().unwrap(),
            Message::Reply { token: 1, .. }
        ));
        assert!(reader.next().await.is_none());
    }
}
