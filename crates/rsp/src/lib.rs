//! GDB remote serial protocol framing.
//!
//! This crate turns the raw byte stream coming from a GDB client into discrete
//! [`RspEvent`]s and serialises replies back onto the wire.
//!
//! # Architecture
//!
//! - [`RspFramer`] is the incremental, push-based framer used by the bridge:
//!   bytes are fed in as they arrive and complete events come out. It also owns
//!   the outgoing side (acknowledgements and reply packets).
//! - [`RspCodec`] wraps the same decoding rules in the tokio-util codec traits,
//!   which is what a client (or a test playing the client) uses.
//! - [`packet`] holds the checksum and hex helpers shared by both.
//!
//! # Scope
//!
//! Only framing lives here. Interpreting packet bodies is the job of the
//! bridge's command dispatcher.

mod codec;
mod error;
mod framer;
pub mod packet;

pub use codec::{RspCodec, RspFrame};
pub use error::{FramingError, SendError};
pub use framer::{DEFAULT_MAX_PACKET_SIZE, Packet, RspEvent, RspFramer};
