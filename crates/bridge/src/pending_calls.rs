//! Correlating agent replies with the work waiting on them
//!
//! Every command sent to the agent registers a [`Continuation`] under a fresh
//! token. The reply for that token takes the continuation out again, so each
//! call completes exactly once. Tokens are never reused, which means a reply
//! arriving after [`PendingCalls::invalidate_all`] is recognisably stale.

use std::collections::HashMap;

use coda::{ContextId, Token};

use crate::memory::MemoryRange;

/// What to do once the agent answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Continuation {
    LoggingListener,
    ProcessStart,
    /// Walking the register tree below `thread`, currently at some child.
    RegisterChildren { thread: ContextId },
    /// Full register read, for a `g` reply or for a stop report when
    /// `stop_signal` is set.
    ReadRegisters {
        thread: u32,
        stop_signal: Option<u8>,
    },
    ReadRegister { thread: u32, index: usize },
    WriteRegister { thread: u32, index: usize },
    ReadMemory {
        /// What was asked of the agent.
        range: MemoryRange,
        /// The uncached part of the GDB request the fetch was planned for.
        needed: MemoryRange,
        buffered: bool,
        /// Snapshot generation the fetch was issued under.
        generation: u64,
    },
    WriteMemory { range: MemoryRange },
    SetBreakpoint { id: String },
    RemoveBreakpoint { id: String },
    Continue,
    Step,
    ModuleResume { context: ContextId },
    Suspend,
    Terminate,
}

#[derive(Debug, Default)]
pub(crate) struct PendingCalls {
    next_token: Token,
    pending: HashMap<Token, Continuation>,
}

impl PendingCalls {
    pub(crate) fn register(&mut self, continuation: Continuation) -> Token {
        self.next_token += 1;
        let token = self.next_token;
        self.pending.insert(token, continuation);
        token
    }

    pub(crate) fn take(&mut self, token: Token) -> Option<Continuation> {
        self.pending.remove(&token)
    }

    /// Forget every outstanding call, returning how many there were.
    pub(crate) fn invalidate_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_call_completes_once() {
        let mut calls = PendingCalls::default();
        let a = calls.register(Continuation::Continue);
        let b = calls.register(Continuation::Step);
        assert_ne!(a, b);
        assert_eq!(calls.len(), 2);

        assert_eq!(calls.take(b), Some(Continuation::Step));
        assert_eq!(calls.take(b), None);
        assert_eq!(calls.take(a), Some(Continuation::Continue));
    }

    #[test]
    fn invalidated_tokens_stay_stale() {
        let mut calls = PendingCalls::default();
        let old = calls.register(Continuation::Suspend);
        assert_eq!(calls.invalidate_all(), 1);

        let new = calls.register(Continuation::Suspend);
        assert_ne!(old, new);
        assert_eq!(calls.take(old), None);
    }
}
