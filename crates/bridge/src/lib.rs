//! Bridge between a GDB remote serial protocol client and a CODA debug agent.
//!
//! # Architecture
//!
//! - [`ProtocolBridge`] holds all session state and does no I/O. GDB bytes,
//!   agent messages and engine commands are pushed into it; GDB replies, agent
//!   requests and engine notifications come out of channels.
//! - [`serve`] owns a bridge on one task and wires it to sockets.
//! - Every agent request is registered with a continuation under its token,
//!   and the reply for that token resumes the work (answering GDB, fetching
//!   more memory, replaying requests deferred behind register discovery).
//!
//! # Lifecycle
//!
//! A session waits for the agent's hello, starts the inferior when the engine
//! asks for it, stops at the executable's load so GDB can attach, and ends on
//! shutdown or when the process goes away. Only one session may use a device at
//! a time, see [`DeviceRegistry`].

mod breakpoint;
mod bridge;
mod device;
mod dispatch;
mod engine;
mod error;
pub mod memory;
mod pending_calls;
pub mod registers;
pub mod run_control;
mod server;
mod session;
mod snapshot;

pub use breakpoint::BreakpointId;
pub use bridge::{BridgeOptions, ProtocolBridge};
pub use device::DeviceRegistry;
pub use engine::{EngineCommand, EngineEvent, EngineNotifier};
pub use error::BridgeError;
pub use memory::{FetchMode, MemoryCache, MemoryRange};
pub use registers::RegisterNames;
pub use run_control::{ResumeKind, RunState};
pub use server::serve;
pub use session::{Bootstrap, Library, Session};
pub use snapshot::{StepRange, ThreadInfo, ThreadSnapshot};
