//! Messages exchanged with the CODA on-device debug agent.
//!
//! The agent speaks a TCF style protocol: the host sends commands tagged with a
//! token, the agent answers each token exactly once and additionally pushes
//! asynchronous events (module loads, thread creation, suspension, log output).
//!
//! - [`Command`] and [`Event`] are the typed view used by the bridge.
//! - [`Message`] is the raw wire view, encoded and decoded by [`CodaCodec`].
//! - [`split`] and [`connect`] turn a byte stream into a reader/writer pair.
//!
//! Request correlation lives in the bridge.

mod codec;
mod command;
mod context;
mod error;
mod event;
mod message;
pub mod payload;
mod reader;
mod transport;
mod writer;

pub mod testing;

pub use codec::CodaCodec;
pub use command::{Command, ProcessStart, ResumeMode, SetBreakpoint};
pub use context::{ContextId, ContextKind};
pub use error::{CodaError, CodecError};
pub use event::{Event, ModuleLoad, RunControlContext};
pub use message::{Incoming, Message, Reply, Request, Token};
pub use reader::CodaReader;
pub use transport::{CodaTransport, split};
pub use writer::CodaWriter;

use std::io;
use tokio::net::{TcpStream, ToSocketAddrs};

/// Connect to an agent listening on TCP.
pub async fn connect(
    addr: impl ToSocketAddrs,
) -> io::Result<(
    CodaReader<tokio::net::tcp::OwnedReadHalf>,
    CodaWriter<tokio::net::tcp::OwnedWriteHalf>,
)> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(split(stream))
}
